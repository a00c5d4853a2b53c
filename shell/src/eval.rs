use std::convert::Infallible;
use std::ffi::{self, CString};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd};

use log::{debug, warn};
use nix::errno::Errno;
use nix::unistd::{self, ForkResult};
use thiserror::Error;

use crate::builtin::{self, Flow};
use crate::global;
use crate::job::JobBuilder;
use crate::redirect::{self, RedirectError};
use crate::types::{Command, Pipeline, Redirect};

/// Exit status of a child whose program could not be found.
pub const STATUS_NOT_FOUND: i32 = 127;
/// Exit status of a child whose program was found but could not be run.
pub const STATUS_NOT_EXECUTABLE: i32 = 126;
/// Exit status of a child that failed before reaching exec.
pub const STATUS_SETUP_FAILED: i32 = 1;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("pipe: {0}")]
	Pipe(nix::Error),
	#[error("fork: {0}")]
	Fork(nix::Error),
	#[error("dup2: {0}")]
	Dup(nix::Error),
	#[error("{0}")]
	Nul(#[from] ffi::NulError),
	#[error(transparent)]
	Redirect(#[from] RedirectError),
	#[error("{0}: command not found")]
	NotFound(String),
	#[error("{name}: {source}")]
	Exec { name: String, source: nix::Error },
}

impl ExecError {
	fn exit_code(&self) -> i32 {
		match *self {
			ExecError::NotFound(..) => STATUS_NOT_FOUND,
			ExecError::Exec { .. } => STATUS_NOT_EXECUTABLE,
			_ => STATUS_SETUP_FAILED,
		}
	}
}

/// A stage with its argv converted in the parent, so conversion errors are
/// reported before anything is forked.
struct Prepared<'a> {
	name: String,
	argv: Vec<CString>,
	redirects: &'a [Redirect],
}

impl<'a> Prepared<'a> {
	fn new(command: &'a Command) -> Result<Prepared<'a>, ExecError> {
		let mut argv: Vec<CString> = Vec::with_capacity(command.arguments.len() + 1);
		argv.push(CString::new(command.name.clone())?);
		for arg in &command.arguments {
			argv.push(CString::new(arg.clone())?);
		}
		Ok(Prepared { name: command.display_name(), argv: argv, redirects: &command.redirects })
	}
}

fn do_exec_command(command: &Prepared) -> Result<Infallible, ExecError> {
	redirect::apply(command.redirects)?;
	match unistd::execvp(&command.argv[0], &command.argv) {
		Ok(never) => Ok(never),
		Err(Errno::ENOENT) => Err(ExecError::NotFound(command.name.clone())),
		Err(e) => Err(ExecError::Exec { name: command.name.clone(), source: e }),
	}
}

// Never returns to shell code: either the image is replaced or the child exits.
fn exec_command(command: &Prepared) -> ! {
	let s = match do_exec_command(command) {
		Ok(never) => match never {},
		Err(e) => {
			let _ = writeln!(&mut io::stderr(), "myshell: {}", e);
			e.exit_code()
		},
	};
	unsafe { libc::_exit(s) }
}

// Stage i reads pipe i-1 and writes pipe i.
fn wire_stage(pipes: &[(OwnedFd, OwnedFd)], i: usize) -> nix::Result<()> {
	if i > 0 {
		unistd::dup2(pipes[i - 1].0.as_raw_fd(), libc::STDIN_FILENO)?;
	}
	if i < pipes.len() {
		unistd::dup2(pipes[i].1.as_raw_fd(), libc::STDOUT_FILENO)?;
	}
	Ok(())
}

fn open_pipes(count: usize) -> Result<Vec<(OwnedFd, OwnedFd)>, ExecError> {
	let mut pipes: Vec<(OwnedFd, OwnedFd)> = Vec::with_capacity(count);
	for _ in 0 .. count {
		pipes.push(unistd::pipe().map_err(ExecError::Pipe)?);
	}
	Ok(pipes)
}

// Forks one child per stage through `fork`, which records the child in the
// builder. Stops at the first fork failure; stages already forked stay recorded.
fn spawn_stages<F>(commands: &[Prepared], mut pipes: Vec<(OwnedFd, OwnedFd)>, job_builder: &mut JobBuilder, mut fork: F) -> Result<(), ExecError>
	where F: FnMut(&mut JobBuilder) -> nix::Result<ForkResult>
{
	debug!("{} stages, {} pipes", commands.len(), pipes.len());
	for (i, command) in commands.iter().enumerate() {
		match fork(job_builder).map_err(ExecError::Fork)? {
			ForkResult::Parent { child } => {
				debug!("stage {} ({}) is pid {}", i, command.name, child);
			},
			ForkResult::Child => {
				let wired = wire_stage(&pipes, i);
				// Every pipe end, in every child. A stray write end keeps the
				// reader from ever seeing EOF.
				pipes.clear();
				if let Err(e) = wired {
					let _ = writeln!(&mut io::stderr(), "myshell: {}", ExecError::Dup(e));
					unsafe { libc::_exit(STATUS_SETUP_FAILED) }
				}
				exec_command(command);
			},
		}
	}
	// `pipes` drops here, so the parent keeps no pipe end open, also on the error paths above.
	Ok(())
}

fn spawn_commands(commands: &[Prepared], job_builder: &mut JobBuilder) -> Result<(), ExecError> {
	let pipes = open_pipes(commands.len().saturating_sub(1))?;
	// SAFETY: the interpreter is single-threaded and the child only
	// rewires descriptors before exec or _exit.
	spawn_stages(commands, pipes, job_builder, |b| unsafe { b.push_fork() })
}

/// Runs one parsed line: a built-in in-process when it is a lone foreground
/// command without redirections, otherwise a forked job. Foreground jobs are
/// waited for; background jobs go to the tracker.
pub fn eval(state: &mut global::State, pipeline: &Pipeline) -> Flow {
	let commands = &pipeline.commands;
	if commands.is_empty() {
		return Flow::Continue;
	}

	if commands.len() == 1 && !pipeline.is_background && commands[0].redirects.is_empty() {
		if let Some(func) = builtin::match_builtin(&commands[0].name) {
			let stdout = io::stdout();
			let mut out = stdout.lock();
			return func(state, &commands[0].arguments, &mut out).unwrap_or_else(|e| {
				let _ = writeln!(&mut io::stderr(), "myshell: {}", e);
				Flow::Continue
			});
		}
	}

	let prepared = match commands.iter().map(Prepared::new).collect::<Result<Vec<Prepared>, ExecError>>() {
		Ok(p) => p,
		Err(e) => {
			let _ = writeln!(&mut io::stderr(), "myshell: {}", e);
			return Flow::Continue;
		},
	};

	// Unflushed output would otherwise be duplicated into every child.
	let _ = io::stdout().flush();
	let mut job_builder = JobBuilder::new(commands[0].display_name(), commands.len());
	if let Err(e) = spawn_commands(&prepared, &mut job_builder) {
		let _ = writeln!(&mut io::stderr(), "myshell: {}", e);
	}
	if job_builder.is_empty() {
		return Flow::Continue;
	}

	let mut job = job_builder.build();
	if pipeline.is_background {
		let stdout = io::stdout();
		if let Err(e) = state.jobs.register(job, &mut stdout.lock()) {
			warn!("background notice: {}", e);
		}
	} else {
		job.wait();
	}
	Flow::Continue
}

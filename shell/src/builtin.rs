use std::env;
use std::ffi::OsStr;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use thiserror::Error;

use crate::global;

/// What the read loop should do after a line.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow {
	Continue,
	Exit(i32),
}

#[derive(Debug, Error)]
pub enum BuiltinError {
	#[error("{0}: missing argument")]
	MissingArgument(&'static str),
	#[error("{0}: too many arguments")]
	TooManyArguments(&'static str),
	#[error("cd: {}: {}", .path.display(), .source)]
	ChangeDir { path: PathBuf, source: io::Error },
	#[error("{0}")]
	Io(#[from] io::Error),
}

pub type Builtin = fn(&mut global::State, &[Vec<u8>], &mut dyn Write) -> Result<Flow, BuiltinError>;

/// Exits with status 0, whatever the arguments and pending jobs.
pub fn builtin_exit(_: &mut global::State, _: &[Vec<u8>], _: &mut dyn Write) -> Result<Flow, BuiltinError> {
	Ok(Flow::Exit(0))
}

pub fn builtin_cd(_: &mut global::State, args: &[Vec<u8>], _: &mut dyn Write) -> Result<Flow, BuiltinError> {
	let target = match args {
		[target] => target,
		[] => { return Err(BuiltinError::MissingArgument("cd")); },
		_ => { return Err(BuiltinError::TooManyArguments("cd")); },
	};
	let path = PathBuf::from(OsStr::from_bytes(target));
	env::set_current_dir(&path).map_err(|e| BuiltinError::ChangeDir { path: path, source: e })?;
	Ok(Flow::Continue)
}

pub fn builtin_jobs(state: &mut global::State, _: &[Vec<u8>], out: &mut dyn Write) -> Result<Flow, BuiltinError> {
	for job in state.jobs.jobs() {
		if let Some(pid) = job.pid() {
			writeln!(out, "[{}] {}", pid, job.name)?;
		}
	}
	out.flush()?;
	Ok(Flow::Continue)
}

pub fn match_builtin(name: &[u8]) -> Option<Builtin> {
	match name {
		b"exit" => Some(builtin_exit as Builtin),
		b"cd" => Some(builtin_cd as Builtin),
		b"jobs" => Some(builtin_jobs as Builtin),
		_ => None,
	}
}

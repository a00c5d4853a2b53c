use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};
use signal_hook::consts::SIGCHLD;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum State { Active, Terminated }

pub trait WaitStatusExt {
	fn state(self) -> State;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> State {
		match self {
			WaitStatus::Exited(..) | WaitStatus::Signaled(..) => State::Terminated,
			_ => State::Active,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub state: State,
}

/// The processes forked for one input line, in stage order.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Job {
	pub name: String,
	pub processes: Vec<Process>,
}

impl Job {
	pub fn state(&self) -> State {
		self.processes.iter().map(|pr| pr.state).min().unwrap_or(State::Terminated)
	}

	/// The pid reported to the user: that of the last stage.
	pub fn pid(&self) -> Option<Pid> {
		self.processes.last().map(|pr| pr.pid)
	}

	fn mark_terminated(&mut self, pid: Pid) -> bool {
		match self.processes.iter_mut().find(|pr| pr.pid == pid) {
			Some(pr) => {
				pr.state = State::Terminated;
				true
			},
			None => false,
		}
	}

	/// Blocks until every process of the job has terminated, in stage order.
	/// Exit statuses are only logged.
	pub fn wait(&mut self) {
		for pr in self.processes.iter_mut().filter(|pr| pr.state == State::Active) {
			wait_terminated(pr.pid);
			pr.state = State::Terminated;
		}
	}
}

fn wait_terminated(pid: Pid) {
	loop {
		match wait::waitpid(pid, None) {
			Ok(status) if status.state() == State::Terminated => {
				debug!("{} finished: {:?}", pid, status);
				return;
			},
			Ok(_) => continue,
			Err(Errno::EINTR) => continue,
			Err(e) => {
				// ECHILD: someone else already collected it
				debug!("waitpid {}: {}", pid, e);
				return;
			},
		}
	}
}

#[derive(Debug)]
pub struct JobBuilder {
	imp: Job,
}

impl JobBuilder {
	pub fn new(name: String, size_hint: usize) -> JobBuilder {
		JobBuilder {
			imp: Job { name: name, processes: Vec::with_capacity(size_hint) }
		}
	}

	/// Forks and records the child in the parent.
	///
	/// # Safety
	///
	/// Same contract as [`unistd::fork`]: the caller must be single-threaded,
	/// or the child must restrict itself to async-signal-safe calls before exec.
	pub unsafe fn push_fork(&mut self) -> nix::Result<unistd::ForkResult> {
		self.push_with(|| unistd::fork())
	}

	/// Like [`JobBuilder::push_fork`], with the fork itself supplied by the caller.
	pub fn push_with<F>(&mut self, fork: F) -> nix::Result<unistd::ForkResult> where F: FnOnce() -> nix::Result<unistd::ForkResult> {
		let r = fork()?;
		if let unistd::ForkResult::Parent { child } = r {
			self.imp.processes.push(Process { pid: child, state: State::Active });
		}
		Ok(r)
	}

	pub fn is_empty(&self) -> bool {
		self.imp.processes.is_empty()
	}

	pub fn build(self) -> Job {
		self.imp
	}
}

/// Registry of background jobs in launch order.
///
/// SIGCHLD only raises a flag; [`JobTracker::sweep`] does the reaping from the
/// main loop, so nothing beyond an atomic store happens in signal context.
#[derive(Debug)]
pub struct JobTracker {
	jobs: Vec<Job>,
	child_exited: Arc<AtomicBool>,
}

impl Default for JobTracker {
	fn default() -> JobTracker {
		JobTracker::new()
	}
}

impl JobTracker {
	pub fn new() -> JobTracker {
		JobTracker { jobs: vec![], child_exited: Arc::new(AtomicBool::new(false)) }
	}

	/// Hooks SIGCHLD to the tracker's flag. Call once, before the first launch.
	pub fn install_reaper(&self) -> io::Result<()> {
		signal_hook::flag::register(SIGCHLD, Arc::clone(&self.child_exited))?;
		Ok(())
	}

	pub fn jobs(&self) -> &[Job] {
		&self.jobs
	}

	/// Adds a background job and prints `[pid] name` to `out`.
	pub fn register<W: Write>(&mut self, job: Job, out: &mut W) -> io::Result<()> {
		if let Some(pid) = job.pid() {
			writeln!(out, "[{}] {}", pid, job.name)?;
			out.flush()?;
		}
		info!("background job {} started: {:?}", job.name, job.processes);
		self.jobs.push(job);
		Ok(())
	}

	/// Collects every child that has already terminated without blocking.
	/// Returns how many were collected. Does nothing unless SIGCHLD arrived
	/// since the previous sweep.
	pub fn sweep(&mut self) -> usize {
		if !self.child_exited.swap(false, Ordering::SeqCst) {
			return 0;
		}
		let mut reaped = 0;
		loop {
			match wait::waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
				Ok(WaitStatus::StillAlive) => break,
				Ok(status) => {
					if let Some(pid) = status.pid() {
						debug!("reaped {}: {:?}", pid, status);
						reaped += 1;
						if let Some(job) = self.reap(pid) {
							info!("background job [{}] {} done", pid, job.name);
						}
					}
				},
				Err(Errno::EINTR) => continue,
				Err(Errno::ECHILD) => break,
				Err(e) => {
					warn!("waitpid: {}", e);
					break;
				},
			}
		}
		reaped
	}

	// Pids we never registered (foreground stragglers) leave the registry alone.
	fn reap(&mut self, pid: Pid) -> Option<Job> {
		let idx = self.jobs.iter_mut().position(|job| job.mark_terminated(pid))?;
		if self.jobs[idx].state() == State::Terminated {
			Some(self.jobs.remove(idx))
		} else {
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn job(name: &str, pids: &[i32]) -> Job {
		Job {
			name: name.to_string(),
			processes: pids.iter().map(|&p| Process { pid: Pid::from_raw(p), state: State::Active }).collect(),
		}
	}

	#[test]
	fn register_prints_notice() {
		let mut tracker = JobTracker::new();
		let mut out: Vec<u8> = vec![];
		tracker.register(job("sleep", &[4242]), &mut out).unwrap();
		assert_eq!(out, b"[4242] sleep\n");
		assert_eq!(tracker.jobs().len(), 1);
	}

	#[test]
	fn pipeline_job_reports_last_stage() {
		let mut tracker = JobTracker::new();
		let mut out: Vec<u8> = vec![];
		tracker.register(job("yes", &[10, 11, 12]), &mut out).unwrap();
		assert_eq!(out, b"[12] yes\n");
	}

	#[test]
	fn reap_removes_single_process_job() {
		let mut tracker = JobTracker::new();
		let mut out: Vec<u8> = vec![];
		tracker.register(job("a", &[1]), &mut out).unwrap();
		tracker.register(job("b", &[2]), &mut out).unwrap();
		tracker.register(job("c", &[3]), &mut out).unwrap();
		let done = tracker.reap(Pid::from_raw(2)).unwrap();
		assert_eq!(done.name, "b");
		let names: Vec<&str> = tracker.jobs().iter().map(|j| j.name.as_str()).collect();
		assert_eq!(names, vec!["a", "c"]);
	}

	#[test]
	fn pipeline_job_stays_until_every_stage_is_reaped() {
		let mut tracker = JobTracker::new();
		let mut out: Vec<u8> = vec![];
		tracker.register(job("cat", &[20, 21]), &mut out).unwrap();
		assert_eq!(tracker.reap(Pid::from_raw(21)), None);
		assert_eq!(tracker.jobs().len(), 1);
		assert_eq!(tracker.jobs()[0].state(), State::Active);
		assert!(tracker.reap(Pid::from_raw(20)).is_some());
		assert!(tracker.jobs().is_empty());
	}

	#[test]
	fn unknown_pid_leaves_registry_alone() {
		let mut tracker = JobTracker::new();
		let mut out: Vec<u8> = vec![];
		tracker.register(job("a", &[1]), &mut out).unwrap();
		assert_eq!(tracker.reap(Pid::from_raw(99)), None);
		assert_eq!(tracker.jobs().len(), 1);
	}

	#[test]
	fn sweep_is_a_no_op_without_sigchld() {
		let mut tracker = JobTracker::new();
		assert_eq!(tracker.sweep(), 0);
	}

	#[test]
	fn job_state_is_the_least_finished_process() {
		let mut j = job("x", &[1, 2]);
		assert_eq!(j.state(), State::Active);
		j.mark_terminated(Pid::from_raw(1));
		assert_eq!(j.state(), State::Active);
		j.mark_terminated(Pid::from_raw(2));
		assert_eq!(j.state(), State::Terminated);
		assert_eq!(job("empty", &[]).state(), State::Terminated);
	}

	#[test]
	fn builder_records_parent_side_only() {
		let mut builder = JobBuilder::new("a".to_string(), 2);
		let r = builder.push_with(|| Ok(unistd::ForkResult::Parent { child: Pid::from_raw(31) }));
		assert!(r.unwrap().is_parent());
		assert!(builder.push_with(|| Ok(unistd::ForkResult::Child)).unwrap().is_child());
		assert_eq!(builder.push_with(|| Err(Errno::EAGAIN)).unwrap_err(), Errno::EAGAIN);
		let job = builder.build();
		assert_eq!(job.processes, vec![Process { pid: Pid::from_raw(31), state: State::Active }]);
	}

	#[test]
	fn wait_status_states() {
		let pid = Pid::from_raw(7);
		assert_eq!(WaitStatus::Exited(pid, 0).state(), State::Terminated);
		assert_eq!(WaitStatus::Signaled(pid, nix::sys::signal::Signal::SIGKILL, false).state(), State::Terminated);
		assert_eq!(WaitStatus::StillAlive.state(), State::Active);
	}
}

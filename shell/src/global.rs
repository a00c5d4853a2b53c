use crate::config::Config;
use crate::job::JobTracker;

/// Everything the read loop carries from one line to the next.
pub struct State {
	pub config: Config,
	pub jobs: JobTracker,
}

impl State {
	pub fn new(config: Config) -> State {
		State { config: config, jobs: JobTracker::new() }
	}
}

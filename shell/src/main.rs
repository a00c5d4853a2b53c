use std::io::{self, BufRead, Write};
use std::process;

use log::warn;

use myshell::builtin::Flow;
use myshell::{config, eval, global, logging, parser};

fn main() {
	let config = config::Config::load();
	logging::init(&config.log);
	let mut state = global::State::new(config);
	if let Err(e) = state.jobs.install_reaper() {
		warn!("SIGCHLD handler not installed, background jobs will not be reaped: {}", e);
	}

	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut stdin_locked = stdin.lock();
	loop {
		state.jobs.sweep();
		let _ = stdout.write_all(state.config.prompt.as_bytes());
		let _ = stdout.flush();

		let mut line: Vec<u8> = vec![];
		match stdin_locked.read_until(b'\n', &mut line) {
			Ok(0) => break,
			Ok(_) => {},
			Err(e) => {
				eprintln!("myshell: read: {}", e);
				break;
			},
		}
		if line.last() == Some(&b'\n') {
			line.pop();
		}

		let pipeline = match parser::parse(&line, &state.config.limits) {
			Ok(Some(pipeline)) => pipeline,
			Ok(None) => continue,
			Err(e) => {
				eprintln!("myshell: {}", e);
				continue;
			},
		};
		if let Flow::Exit(code) = eval::eval(&mut state, &pipeline) {
			let _ = stdout.flush();
			process::exit(code);
		}
	}
}

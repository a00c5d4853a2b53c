#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub struct Session {
	pub status: i32,
	pub stdout: String,
	pub stderr: String,
}

/// A fresh, empty directory unique to this test process and `name`.
pub fn scratch(name: &str) -> PathBuf {
	let dir = std::env::temp_dir().join(format!("myshell_it_{}_{}", std::process::id(), name));
	let _ = fs::remove_dir_all(&dir);
	fs::create_dir_all(&dir).expect("create scratch dir");
	dir.canonicalize().expect("canonical scratch dir")
}

/// Feeds `script` to the interpreter on stdin, running in `dir`, and collects
/// everything it printed once stdin is exhausted.
pub fn run_in(dir: &Path, script: &str) -> Session {
	run_with_config(dir, script, &dir.join("no-such-config.toml"))
}

pub fn run_with_config(dir: &Path, script: &str, config: &Path) -> Session {
	let mut child = Command::new(env!("CARGO_BIN_EXE_myshell"))
		.current_dir(dir)
		.env("MYSHELL_CONFIG", config)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.expect("spawn myshell");
	child.stdin.take().expect("stdin").write_all(script.as_bytes()).expect("write script");
	let output = child.wait_with_output().expect("wait for myshell");
	Session {
		status: output.status.code().unwrap_or(-1),
		stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
		stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
	}
}

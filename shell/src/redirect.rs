use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};

use nix::unistd;
use thiserror::Error;

use crate::types::{Redirect, RedirectType};

const OUTPUT_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum RedirectError {
	#[error("{}: {}", String::from_utf8_lossy(.target), .source)]
	Open { target: Vec<u8>, source: io::Error },
	#[error("dup2: {0}")]
	Dup(#[from] nix::Error),
}

impl RedirectType {
	fn fd(self) -> RawFd {
		match self {
			RedirectType::Input => libc::STDIN_FILENO,
			RedirectType::Output => libc::STDOUT_FILENO,
		}
	}
}

/// Input files must exist; output files are created or truncated with mode 0644.
/// Names resolve against the current directory.
pub fn open(redirect: &Redirect) -> io::Result<fs::File> {
	let mut oopt = fs::OpenOptions::new();
	let _ = match redirect.typ {
		RedirectType::Input => oopt.read(true),
		RedirectType::Output => oopt.write(true).create(true).truncate(true).mode(OUTPUT_MODE),
	};
	oopt.open(OsStr::from_bytes(&redirect.target))
}

/// Rebinds stdin/stdout of the calling process. Meant to run in a forked
/// child after pipe wiring, so a file always wins over a pipe end.
/// All input redirections are applied before any output redirection.
pub fn apply(redirects: &[Redirect]) -> Result<(), RedirectError> {
	for typ in [RedirectType::Input, RedirectType::Output] {
		for redirect in redirects.iter().filter(|r| r.typ == typ) {
			let file = open(redirect).map_err(|e| RedirectError::Open { target: redirect.target.clone(), source: e })?;
			unistd::dup2(file.as_raw_fd(), typ.fd())?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{Read, Write};
	use std::os::unix::fs::PermissionsExt;
	use std::path::PathBuf;

	fn scratch(name: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("myshell_redirect_{}_{}", std::process::id(), name));
		let _ = fs::remove_dir_all(&dir);
		fs::create_dir_all(&dir).expect("create scratch dir");
		dir
	}

	fn redirect(path: &PathBuf, typ: RedirectType) -> Redirect {
		Redirect { target: path.as_os_str().as_bytes().to_vec(), typ: typ }
	}

	#[test]
	fn output_is_created_with_mode_0644() {
		let dir = scratch("create");
		let path = dir.join("out.txt");
		drop(open(&redirect(&path, RedirectType::Output)).unwrap());
		let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
		// the process umask may only clear bits
		assert_eq!(mode & !0o644, 0);
		let _ = fs::remove_dir_all(dir);
	}

	#[test]
	fn output_truncates_existing_file() {
		let dir = scratch("truncate");
		let path = dir.join("out.txt");
		fs::write(&path, b"old contents that are long").unwrap();
		let mut file = open(&redirect(&path, RedirectType::Output)).unwrap();
		file.write_all(b"new").unwrap();
		drop(file);
		assert_eq!(fs::read(&path).unwrap(), b"new");
		let _ = fs::remove_dir_all(dir);
	}

	#[test]
	fn input_must_exist() {
		let dir = scratch("input");
		let missing = dir.join("missing.txt");
		let err = open(&redirect(&missing, RedirectType::Input)).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotFound);
		assert!(!missing.exists());

		let present = dir.join("present.txt");
		fs::write(&present, b"hello").unwrap();
		let mut s = String::new();
		open(&redirect(&present, RedirectType::Input)).unwrap().read_to_string(&mut s).unwrap();
		assert_eq!(s, "hello");
		let _ = fs::remove_dir_all(dir);
	}

	#[test]
	fn open_error_names_the_file() {
		let e = RedirectError::Open {
			target: b"nope.txt".to_vec(),
			source: io::Error::from(io::ErrorKind::NotFound),
		};
		assert!(e.to_string().starts_with("nope.txt: "));
	}
}

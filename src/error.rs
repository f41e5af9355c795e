use std::{ffi, io};
use std::io::Write;
use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	#[error("syntax error: empty pipeline stage")]
	EmptyStage,
	#[error("syntax error: empty command")]
	EmptyCommand,
	#[error("syntax error: missing target after '{operator}'")]
	MissingRedirectTarget { operator: &'static str },
	#[error("syntax error: more than {limit} pipeline stages")]
	TooManyStages { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
	#[error("syntax error: expected 'if'")]
	MissingIf,
	#[error("syntax error: expected 'then'")]
	MissingThen,
	#[error("syntax error: expected 'fi'")]
	MissingFi,
}

/// Failure inside a forked child, before or instead of exec.
#[derive(Debug, Error)]
pub enum ChildError<'a> {
	#[error("{path}: {errno}")]
	Open { path: &'a str, errno: Errno },
	#[error("{program}: {errno}")]
	Exec { program: &'a str, errno: Errno },
}

impl<'a> ChildError<'a> {
	pub fn exit_code(&self) -> i32 {
		match *self {
			ChildError::Open { .. } => 1,
			ChildError::Exec { .. } => 127,
		}
	}

	/// Writes `ish: <error>` to standard error without touching the heap.
	pub fn report(&self) {
		let mut buf = [0u8; 512];
		let len = {
			let mut cursor = io::Cursor::new(&mut buf[..]);
			let _ = writeln!(cursor, "ish: {}", self);
			cursor.position() as usize
		};
		let stderr = unsafe { BorrowedFd::borrow_raw(libc::STDERR_FILENO) };
		let _ = nix::unistd::write(stderr, &buf[..len]);
	}
}

#[derive(Debug, Error)]
pub enum EngineError {
	#[error(transparent)]
	Parse(#[from] ParseError),
	#[error(transparent)]
	Syntax(#[from] SyntaxError),
	#[error("cannot spawn: {0}")]
	Spawn(#[from] nix::Error),
	#[error("wait for {pid} failed: {source}")]
	Wait { pid: Pid, source: nix::Error },
	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] ffi::NulError),
	#[error(transparent)]
	Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

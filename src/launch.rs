use std::convert::Infallible;
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use log::debug;
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;

use crate::error::{ChildError, ParseError, Result};
use crate::job::JobBuilder;
use crate::plan::{ErrOutput, Input, Output, StagePlan};
use crate::signal::{self, ForegroundGuard};

struct FileRedirect<'a> {
	path: &'a str,
	c_path: CString,
	flags: OFlag,
	to: RawFd,
}

impl<'a> FileRedirect<'a> {
	fn new(path: &'a str, flags: OFlag, to: RawFd) -> Result<FileRedirect<'a>> {
		Ok(FileRedirect { path: path, c_path: CString::new(path)?, flags: flags, to: to })
	}

	fn apply(&self) -> std::result::Result<(), ChildError<'a>> {
		let open_err = |errno| ChildError::Open { path: self.path, errno: errno };
		let fd = fcntl::open(self.c_path.as_c_str(), self.flags, Mode::from_bits_truncate(0o660))
			.map_err(open_err)?;
		unistd::dup2(fd, self.to).map_err(open_err)?;
		let _ = unistd::close(fd);
		Ok(())
	}
}

/// A stage with every string converted up front, so the child never
/// allocates between fork and exec.
struct Prepared<'a> {
	plan: &'a StagePlan,
	argv: Vec<CString>,
	redirects: Vec<FileRedirect<'a>>,
}

impl<'a> Prepared<'a> {
	fn new(plan: &'a StagePlan) -> Result<Prepared<'a>> {
		if plan.argv.is_empty() {
			return Err(ParseError::EmptyCommand.into());
		}
		let argv = plan.argv.iter()
			.map(|a| CString::new(a.as_str()))
			.collect::<std::result::Result<Vec<CString>, _>>()?;
		let mut redirects = vec![];
		if let Input::File(ref path) = plan.stdin {
			redirects.push(FileRedirect::new(path, OFlag::O_RDONLY, libc::STDIN_FILENO)?);
		}
		if let Output::File { ref path, append } = plan.stdout {
			let mode = if append { OFlag::O_APPEND } else { OFlag::O_TRUNC };
			redirects.push(FileRedirect::new(path, OFlag::O_WRONLY | OFlag::O_CREAT | mode, libc::STDOUT_FILENO)?);
		}
		if let ErrOutput::File(ref path) = plan.stderr {
			redirects.push(FileRedirect::new(path, OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC, libc::STDERR_FILENO)?);
		}
		Ok(Prepared { plan: plan, argv: argv, redirects: redirects })
	}
}

fn do_exec_stage<'a>(stage: &Prepared<'a>, pipe_in: Option<&OwnedFd>, pipe_out: Option<&OwnedFd>)
                     -> std::result::Result<Infallible, ChildError<'a>> {
	let program = stage.plan.name();
	let exec_err = |errno: Errno| ChildError::Exec { program: program, errno: errno };

	if stage.plan.stdin == Input::Pipe {
		if let Some(fd) = pipe_in {
			unistd::dup2(fd.as_raw_fd(), libc::STDIN_FILENO).map_err(exec_err)?;
		}
	}
	if let Some(fd) = pipe_out {
		unistd::dup2(fd.as_raw_fd(), libc::STDOUT_FILENO).map_err(exec_err)?;
	}
	for redirect in &stage.redirects {
		redirect.apply()?;
	}
	// Every pipe end is close-on-exec, so only 0, 1 and 2 survive.
	let errno = match unistd::execvp(stage.argv[0].as_c_str(), &stage.argv) {
		Ok(never) => match never {},
		Err(errno) => errno,
	};
	Err(exec_err(errno))
}

fn exec_stage(stage: &Prepared, pipe_in: Option<&OwnedFd>, pipe_out: Option<&OwnedFd>) -> ! {
	signal::reset_for_child();
	let e = match do_exec_stage(stage, pipe_in, pipe_out) {
		Ok(never) => match never {},
		Err(e) => e,
	};
	e.report();
	unsafe { libc::_exit(e.exit_code()) }
}

/// Forks one child per stage, left to right, wiring each to its neighbours.
///
/// The parent keeps only the read end of the newest pipe, and only until the
/// next stage has been forked, so no pipe end outlives this call in the
/// parent. Stages forked before a failure stay in `job_builder`.
///
/// Each stage of a foreground job is handed to `foreground` as soon as it
/// exists, so SIGINT reaches it even while later stages are being forked.
pub fn spawn(plans: &[StagePlan], job_builder: &mut JobBuilder, mut foreground: Option<&mut ForegroundGuard>)
             -> Result<()> {
	let stages = plans.iter().map(Prepared::new).collect::<Result<Vec<Prepared>>>()?;

	let mut pipe_in: Option<OwnedFd> = None;
	for stage in &stages {
		let pipe = if stage.plan.feeds_pipe() {
			Some(unistd::pipe2(OFlag::O_CLOEXEC)?)
		} else {
			None
		};
		match job_builder.push_fork()? {
			unistd::ForkResult::Parent{ child } => {
				debug!("stage {:?} is pid {}", stage.plan.argv, child);
				if let Some(guard) = foreground.as_mut() {
					guard.track(child, job_builder.pgid());
				}
				// Drops the write end and the previous read end.
				pipe_in = pipe.map(|(pipe_read, _)| pipe_read);
			},
			unistd::ForkResult::Child => {
				exec_stage(stage, pipe_in.as_ref(), pipe.as_ref().map(|(_, pipe_write)| pipe_write));
			},
		}
	}
	Ok(())
}

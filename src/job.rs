use std::os::fd::BorrowedFd;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use crate::error::{EngineError, Result};
use crate::types::ExitStatus;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum State { Active, Stopped, Terminated }

pub trait WaitStatusExt {
	fn state(self) -> State;
	fn exit_status(self) -> Option<ExitStatus>;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> State {
		match self {
			WaitStatus::Exited(..) | WaitStatus::Signaled(..) => State::Terminated,
			WaitStatus::Stopped(..) => State::Stopped,
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(..) | WaitStatus::PtraceSyscall(..) => State::Stopped,
			WaitStatus::Continued(..) | WaitStatus::StillAlive => State::Active,
		}
	}

	fn exit_status(self) -> Option<ExitStatus> {
		match self {
			WaitStatus::Exited(_, code) => Some(ExitStatus::from_code(code as u8)),
			WaitStatus::Signaled(_, sig, _) => Some(ExitStatus::from_signal(sig as i32)),
			_ => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub status: WaitStatus,
}

/// The processes spawned for one pipeline, in spawn order.
///
/// `pgid` is the job's own process group with job control, else the shell's.
#[derive(Debug)]
pub struct Job {
	pub pgid: Pid,
	pub processes: Vec<Process>,
	pub is_background: bool,
	pub text: String,
}

fn retry_eintr<T, F>(mut f: F) -> nix::Result<T> where F: FnMut() -> nix::Result<T> {
	loop {
		match f() {
			Err(Errno::EINTR) => continue,
			r => return r,
		}
	}
}

// Stop and resume is not supported, so a stopped stage would block its
// wait forever.
fn release_stopped(pid: Pid, sig: Signal) {
	match sig {
		Signal::SIGTTIN | Signal::SIGTTOU => {
			warn!("pid {} stopped on terminal access; killing it", pid);
			let _ = kill(pid, Signal::SIGKILL);
		},
		_ => {
			warn!("pid {} stopped by {}; continuing it", pid, sig);
			let _ = kill(pid, Signal::SIGCONT);
		},
	}
}

impl Job {
	/// First process of the job, the one shown for it in job listings.
	pub fn leader(&self) -> Pid {
		self.processes.first().map_or(self.pgid, |pr| pr.pid)
	}

	pub fn state(&self) -> State {
		self.processes.iter().map(|pr| pr.status.state()).min().unwrap_or(State::Terminated)
	}

	/// Status of the last stage, once it has terminated.
	pub fn last_status(&self) -> Option<ExitStatus> {
		self.processes.last().and_then(|pr| pr.status.exit_status())
	}

	/// Blocks until every stage has terminated, in spawn order. Stages that
	/// stop are continued, or killed if they stopped for the terminal.
	///
	/// A failed wait does not stop the others from being collected; the first
	/// failure is returned once all of them were tried.
	pub fn wait(&mut self) -> Result<()> {
		let mut first_err = None;
		for pr in self.processes.iter_mut() {
			while pr.status.state() != State::Terminated {
				match retry_eintr(|| waitpid(pr.pid, Some(WaitPidFlag::WUNTRACED))) {
					Ok(WaitStatus::Stopped(pid, sig)) => release_stopped(pid, sig),
					Ok(status) => {
						debug!("pid {} -> {:?}", pr.pid, status);
						pr.status = status;
					},
					Err(e) => {
						warn!("waitpid({}) failed: {}", pr.pid, e);
						if first_err.is_none() {
							first_err = Some(EngineError::Wait { pid: pr.pid, source: e });
						}
						break;
					},
				}
			}
		}
		match first_err {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	/// Collects whatever stages have finished without blocking.
	pub fn poll(&mut self) {
		for pr in self.processes.iter_mut().filter(|pr| pr.status.state() != State::Terminated) {
			match retry_eintr(|| waitpid(pr.pid, Some(WaitPidFlag::WNOHANG))) {
				Ok(WaitStatus::StillAlive) => {},
				Ok(status) => pr.status = status,
				Err(e) => {
					// Nothing left to wait for; treat the process as gone.
					warn!("lost track of background pid {}: {}", pr.pid, e);
					pr.status = WaitStatus::Exited(pr.pid, 0);
				},
			}
		}
	}
}

#[derive(Debug)]
pub struct JobBuilder {
	imp: Job,
	own_group: bool,
	take_terminal: bool,
}

impl JobBuilder {
	/// With `job_control` the job gets a process group of its own, and a
	/// foreground job also takes the controlling terminal from inside each
	/// child, before exec. Without it the stages stay in the shell's group,
	/// so they can read the terminal like the shell itself.
	pub fn new(size_hint: usize, is_background: bool, job_control: bool) -> JobBuilder {
		JobBuilder {
			imp: Job {
				pgid: if job_control { Pid::from_raw(0) } else { unistd::getpgrp() },
				processes: Vec::with_capacity(size_hint),
				is_background: is_background,
				text: String::new(),
			},
			own_group: job_control,
			take_terminal: job_control && !is_background,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.imp.processes.is_empty()
	}

	/// Process group of the stages forked so far.
	pub fn pgid(&self) -> Pid {
		self.imp.pgid
	}

	/// Forks one stage and, with job control, puts it in the job's process
	/// group.
	///
	/// The group is the first child's pid. Both sides call `setpgid` so the
	/// group exists whichever of them runs first.
	pub fn push_fork(&mut self) -> nix::Result<unistd::ForkResult> {
		let own_group = self.own_group;
		let job = &mut self.imp;
		let is_leader = job.processes.is_empty();

		// SAFETY: the child only performs async-signal-safe calls (dup2,
		// open, close, setpgid, execvp, _exit) on data prepared before this
		// point.
		let r = unsafe { unistd::fork() }?;
		match r {
			unistd::ForkResult::Parent{ child: pid } => {
				if own_group {
					if is_leader {
						job.pgid = pid;
					}
					// The child may already have exec'd; EACCES is fine then.
					let _ = unistd::setpgid(pid, job.pgid);
				}
				job.processes.push(Process { pid: pid, status: WaitStatus::StillAlive });
				debug!("spawned pid {} in group {}", pid, job.pgid);
			},
			unistd::ForkResult::Child if own_group => {
				let pgid = if is_leader { Pid::from_raw(0) } else { job.pgid };
				let _ = unistd::setpgid(Pid::from_raw(0), pgid);
				if self.take_terminal {
					let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
					let _ = unistd::tcsetpgrp(stdin, unistd::getpgrp());
				}
			},
			unistd::ForkResult::Child => {},
		}
		Ok(r)
	}

	pub fn build(mut self, text: &str) -> Job {
		self.imp.text = text.to_owned();
		self.imp
	}
}

/// Background jobs still running, numbered from 1 like a shell's job table.
#[derive(Debug, Default)]
pub struct JobSet {
	jobs: Vec<Option<Job>>,
}

impl JobSet {
	pub fn new() -> JobSet {
		JobSet { jobs: vec![] }
	}

	/// Stores a job in the lowest free slot and returns its job number.
	pub fn push(&mut self, job: Job) -> usize {
		let jobs = &mut self.jobs;
		let idx = match jobs.iter().position(Option::is_none) {
			Some(i) => {
				jobs[i] = Some(job);
				i
			},
			None => {
				jobs.push(Some(job));
				jobs.len() - 1
			},
		};
		idx + 1
	}

	pub fn len(&self) -> usize {
		self.jobs.iter().filter(|o| o.is_some()).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn iter(&self) -> impl Iterator<Item = (usize, &Job)> {
		self.jobs.iter().enumerate().filter_map(|(i, o)| o.as_ref().map(|job| (i + 1, job)))
	}

	/// Reaps finished background processes and removes jobs whose stages
	/// have all terminated, returning them with their job numbers.
	pub fn reap(&mut self) -> Vec<(usize, Job)> {
		let mut done = vec![];
		for (i, slot) in self.jobs.iter_mut().enumerate() {
			let finished = match *slot {
				Some(ref mut job) => {
					job.poll();
					job.state() == State::Terminated
				},
				None => false,
			};
			if finished {
				if let Some(job) = slot.take() {
					info!("job [{}] finished: {}", i + 1, job.text);
					done.push((i + 1, job));
				}
			}
		}
		let len = self.jobs.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
		self.jobs.truncate(len);
		done
	}
}

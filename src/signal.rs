//! SIGINT forwarding to the foreground job.
//!
//! The handler cannot reach the engine, so the foreground job is mirrored
//! into atomics: its process group when it has one of its own, else each of
//! its pids. Only [`ForegroundGuard`] writes them.

use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicUsize, Ordering};

use log::{debug, warn};
use nix::sys::signal::{self, kill, killpg, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{self, Pid};

/// Stages beyond this many are not forwarded to one by one. They share the
/// shell's process group then, so a terminal's SIGINT still reaches them.
pub const FOREGROUND_SLOTS: usize = 256;
const BANNER_CAPACITY: usize = 256;

#[allow(clippy::declare_interior_mutable_const)]
const NO_PID: AtomicI32 = AtomicI32::new(0);
#[allow(clippy::declare_interior_mutable_const)]
const NUL: AtomicU8 = AtomicU8::new(0);

static FOREGROUND_PGID: AtomicI32 = AtomicI32::new(0);
static FOREGROUND_PIDS: [AtomicI32; FOREGROUND_SLOTS] = [NO_PID; FOREGROUND_SLOTS];
static IDLE_BANNER: Banner = Banner::new();

/// Fixed buffer the handler can read without locking or allocating.
pub struct Banner {
	bytes: [AtomicU8; BANNER_CAPACITY],
	len: AtomicUsize,
}

impl Banner {
	pub const fn new() -> Banner {
		Banner { bytes: [NUL; BANNER_CAPACITY], len: AtomicUsize::new(0) }
	}

	/// Replaces the text, cutting it at the buffer's capacity.
	pub fn store(&self, text: &[u8]) {
		let text = &text[.. text.len().min(BANNER_CAPACITY)];
		self.len.store(0, Ordering::SeqCst);
		for (slot, &b) in self.bytes.iter().zip(text) {
			slot.store(b, Ordering::Relaxed);
		}
		self.len.store(text.len(), Ordering::SeqCst);
	}

	pub fn load<'b>(&self, buf: &'b mut [u8; BANNER_CAPACITY]) -> &'b [u8] {
		let len = self.len.load(Ordering::SeqCst);
		for (b, slot) in buf.iter_mut().zip(&self.bytes[.. len]) {
			*b = slot.load(Ordering::Relaxed);
		}
		&buf[.. len]
	}
}

impl Default for Banner {
	fn default() -> Banner {
		Banner::new()
	}
}

fn forward_sigint() -> bool {
	let pgid = FOREGROUND_PGID.load(Ordering::SeqCst);
	if pgid > 0 {
		let _ = killpg(Pid::from_raw(pgid), Signal::SIGINT);
		return true;
	}
	let mut forwarded = false;
	for slot in FOREGROUND_PIDS.iter() {
		let pid = slot.load(Ordering::SeqCst);
		if pid > 0 {
			let _ = kill(Pid::from_raw(pid), Signal::SIGINT);
			forwarded = true;
		}
	}
	forwarded
}

extern "C" fn handle_sigint(_: libc::c_int) {
	if forward_sigint() {
		return;
	}
	let mut buf = [0u8; BANNER_CAPACITY];
	let banner = IDLE_BANNER.load(&mut buf);
	let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
	let _ = unistd::write(stdout, banner);
}

/// Installs the SIGINT handler for the rest of the process lifetime.
///
/// With job control the shell also ignores SIGTTOU, so it can take the
/// terminal back from a finished job, and SIGTSTP, since stopped jobs cannot
/// be resumed.
pub fn install(job_control: bool) -> nix::Result<()> {
	let action = SigAction::new(SigHandler::Handler(handle_sigint), SaFlags::SA_RESTART, SigSet::empty());
	// SAFETY: the handler only touches atomics and calls kill/killpg/write.
	unsafe { signal::sigaction(Signal::SIGINT, &action) }?;
	if job_control {
		let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
		unsafe {
			signal::sigaction(Signal::SIGTTOU, &ignore)?;
			signal::sigaction(Signal::SIGTSTP, &ignore)?;
		}
	}
	debug!("signal handlers installed (job control: {})", job_control);
	Ok(())
}

/// Restores default dispositions in a freshly forked child.
pub fn reset_for_child() {
	for &sig in &[Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU] {
		let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
	}
}

/// Sets what the handler prints when no job is in the foreground.
pub fn set_idle_banner(text: &str) {
	IDLE_BANNER.store(text.as_bytes());
}

/// The first stage the handler would forward SIGINT to, if any.
pub fn foreground_pid() -> Option<Pid> {
	match FOREGROUND_PGID.load(Ordering::SeqCst) {
		0 => FOREGROUND_PIDS.iter()
			.map(|slot| slot.load(Ordering::SeqCst))
			.find(|&pid| pid > 0)
			.map(Pid::from_raw),
		pgid => Some(Pid::from_raw(pgid)),
	}
}

/// Marks the stages of one foreground job as they are forked, and clears
/// the marks when dropped.
///
/// With `job_control` the job has its own process group, which also gets the
/// terminal until the guard is dropped.
#[derive(Debug)]
pub struct ForegroundGuard {
	job_control: bool,
	tracked: usize,
}

impl ForegroundGuard {
	pub fn new(job_control: bool) -> ForegroundGuard {
		ForegroundGuard { job_control: job_control, tracked: 0 }
	}

	/// Records a freshly forked stage; call it right after each fork.
	pub fn track(&mut self, pid: Pid, pgid: Pid) {
		if self.job_control {
			if pid == pgid {
				FOREGROUND_PGID.store(pgid.as_raw(), Ordering::SeqCst);
				let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
				let _ = unistd::tcsetpgrp(stdin, pgid);
			}
			return;
		}
		match FOREGROUND_PIDS.get(self.tracked) {
			Some(slot) => {
				slot.store(pid.as_raw(), Ordering::SeqCst);
				self.tracked += 1;
			},
			None => warn!("pid {} not tracked for SIGINT forwarding", pid),
		}
	}
}

impl Drop for ForegroundGuard {
	fn drop(&mut self) {
		FOREGROUND_PGID.store(0, Ordering::SeqCst);
		for slot in &FOREGROUND_PIDS[.. self.tracked] {
			slot.store(0, Ordering::SeqCst);
		}
		if self.job_control {
			let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
			if let Err(e) = unistd::tcsetpgrp(stdin, unistd::getpgrp()) {
				debug!("cannot take the terminal back: {}", e);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn banner_is_replaced_in_place() {
		let banner = Banner::new();
		let mut buf = [0u8; BANNER_CAPACITY];
		assert_eq!(banner.load(&mut buf), b"");

		banner.store(b"\nYou typed Control-C!\nhello: ");
		assert_eq!(banner.load(&mut buf), b"\nYou typed Control-C!\nhello: ");
		banner.store(b"ish: ");
		assert_eq!(banner.load(&mut buf), b"ish: ");
	}

	#[test]
	fn banner_is_cut_at_capacity() {
		let banner = Banner::new();
		let long = vec![b'x'; BANNER_CAPACITY + 10];
		banner.store(&long);
		let mut buf = [0u8; BANNER_CAPACITY];
		assert_eq!(banner.load(&mut buf), &long[.. BANNER_CAPACITY]);
	}
}

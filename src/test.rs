use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use std::{fs, thread};

use nix::sys::signal::{kill, Signal};
use nix::unistd::{self, getpid, Pid};

use crate::error::{EngineError, ParseError, SyntaxError};
use crate::eval::{Engine, EvalResult, Options};
use crate::job::JobBuilder;
use crate::launch;
use crate::plan;
use crate::signal::{self, ForegroundGuard};
use crate::types::{Command, ExitStatus, Pipeline};

// Forking tests share fd tables and signal state.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
	SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn engine() -> Engine {
	Engine::new(Options::default())
}

fn read(path: &Path) -> String {
	fs::read_to_string(path).unwrap()
}

/// Polls until the SIGINT handler has a foreground stage to forward to.
fn wait_for_foreground() -> Pid {
	let start = Instant::now();
	loop {
		if let Some(pid) = signal::foreground_pid() {
			return pid;
		}
		assert!(start.elapsed() < Duration::from_secs(3), "no foreground job");
		thread::sleep(Duration::from_millis(10));
	}
}

fn status(code: u8) -> ExitStatus {
	ExitStatus::from_code(code)
}

/// Open descriptors that point at pipes or into `dir`.
fn tracked_fds(dir: &Path) -> Vec<String> {
	let mut fds = vec![];
	for entry in fs::read_dir("/proc/self/fd").unwrap() {
		let entry = entry.unwrap();
		if let Ok(target) = fs::read_link(entry.path()) {
			let target = target.to_string_lossy().into_owned();
			if target.starts_with("pipe:") || target.starts_with(dir.to_str().unwrap()) {
				fds.push(format!("{:?} -> {}", entry.file_name(), target));
			}
		}
	}
	fds.sort();
	fds
}

#[test]
fn pipe_composes_stages() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("out");
	let mut e = engine();
	let r = e.run_pipeline(&format!("echo hi | tr h H > {}", out.display())).unwrap();
	assert_eq!(r, EvalResult::Done(ExitStatus::SUCCESS));
	assert_eq!(read(&out), "Hi\n");

	let r = e.run_pipeline(&format!("echo b a | tr a-z A-Z | tr B X > {}", out.display())).unwrap();
	assert_eq!(r, EvalResult::Done(ExitStatus::SUCCESS));
	assert_eq!(read(&out), "X A\n");
}

#[test]
fn output_redirection_truncates_and_appends() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let f = dir.path().join("f.txt");
	let mut e = engine();
	e.run_line(&format!("echo a > {}", f.display())).unwrap();
	assert_eq!(read(&f), "a\n");
	e.run_line(&format!("echo b >> {}", f.display())).unwrap();
	assert_eq!(read(&f), "a\nb\n");
	e.run_line(&format!("echo c > {}", f.display())).unwrap();
	assert_eq!(read(&f), "c\n");
}

#[test]
fn error_and_input_redirection() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let err = dir.path().join("err");
	let input = dir.path().join("in");
	let mut e = engine();

	let s = e.run_line(&format!("ls {}/nothere 2> {}", dir.path().display(), err.display())).unwrap();
	assert!(!s.success());
	assert!(read(&err).contains("nothere"));

	fs::write(&input, "b\na\n").unwrap();
	let out = dir.path().join("out");
	e.run_line(&format!("cat {} | sort > {}", input.display(), out.display())).unwrap();
	assert_eq!(read(&out), "a\nb\n");
}

#[test]
fn status_comes_from_last_stage() {
	let _lock = serial();
	let mut e = engine();
	assert_eq!(e.run_line("false | true").unwrap(), ExitStatus::SUCCESS);
	assert_eq!(e.run_line("true | false").unwrap(), status(1));
	assert_eq!(e.last_status(), status(1));
}

#[test]
fn missing_program_is_127() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("out");
	let mut e = engine();
	let s = e.run_line(&format!("echo x | ish-no-such-program > {}", out.display())).unwrap();
	assert_eq!(s, ExitStatus::NOT_FOUND);
	assert_eq!(read(&out), "");
}

#[test]
fn unopenable_redirect_is_1() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let mut e = engine();
	let s = e.run_line(&format!("cat < {}/missing", dir.path().display())).unwrap();
	assert_eq!(s, ExitStatus::FAILURE);
	let s = e.run_line(&format!("echo x > {}/no/such/dir", dir.path().display())).unwrap();
	assert_eq!(s, ExitStatus::FAILURE);
}

#[test]
fn parse_errors_spawn_nothing() {
	let _lock = serial();
	let mut e = engine();
	e.run_line("false").unwrap();
	match e.run_line("ls |") {
		Err(EngineError::Parse(ParseError::EmptyStage)) => {},
		r => panic!("unexpected {:?}", r),
	}
	match e.run_line("cat >") {
		Err(EngineError::Parse(ParseError::MissingRedirectTarget { operator: ">" })) => {},
		r => panic!("unexpected {:?}", r),
	}
	assert_eq!(e.last_status(), status(1));
}

#[test]
fn background_returns_immediately() {
	let _lock = serial();
	let mut e = engine();
	e.run_line("false").unwrap();

	let start = Instant::now();
	let r = e.run_pipeline("sleep 1 &").unwrap();
	assert!(start.elapsed() < Duration::from_millis(500));
	match r {
		EvalResult::Background { job: 1, .. } => {},
		r => panic!("unexpected {:?}", r),
	}
	assert_eq!(e.last_status(), status(1));
	assert_eq!(e.jobs().len(), 1);

	thread::sleep(Duration::from_millis(1500));
	let done = e.reap_background();
	assert_eq!(done.len(), 1);
	assert_eq!(done[0].1.last_status(), Some(ExitStatus::SUCCESS));
	assert!(e.jobs().is_empty());
	assert_eq!(e.last_status(), status(1));
}

#[test]
fn conditional_single_line() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("out");
	let mut e = engine();

	e.run_line(&format!("if false then echo yes > {0} else echo no > {0} fi", out.display())).unwrap();
	assert_eq!(read(&out), "no\n");

	e.run_line(&format!("if true then echo yes > {0} else echo no > {0} fi", out.display())).unwrap();
	assert_eq!(read(&out), "yes\n");

	fs::remove_file(&out).unwrap();
	let s = e.run_line(&format!("if false then echo yes > {} fi", out.display())).unwrap();
	assert_eq!(s, status(1));
	assert!(!out.exists());
}

#[test]
fn conditional_multi_line_runs_every_branch_command() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("out");
	let mut e = engine();

	let lines = vec![
		format!("echo one >> {}", out.display()),
		"ish-no-such-program".to_owned(),
		"ls |".to_owned(),
		format!("echo two | tr t T >> {}", out.display()),
		"else".to_owned(),
		format!("echo nope >> {}", out.display()),
		"fi".to_owned(),
	];
	let r = e.execute("if echo cond | grep -q cond then", &mut lines.into_iter()).unwrap();
	assert_eq!(r, EvalResult::Done(ExitStatus::SUCCESS));
	assert_eq!(read(&out), "one\nTwo\n");
}

#[test]
fn conditional_syntax_errors_run_nothing() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("out");
	let mut e = engine();

	let lines = vec![format!("echo x > {}", out.display())];
	match e.execute("if true then", &mut lines.into_iter()) {
		Err(EngineError::Syntax(SyntaxError::MissingFi)) => {},
		r => panic!("unexpected {:?}", r),
	}
	match e.execute("if true", &mut std::iter::empty::<String>()) {
		Err(EngineError::Syntax(SyntaxError::MissingThen)) => {},
		r => panic!("unexpected {:?}", r),
	}
	assert!(!out.exists());
}

#[test]
fn no_descriptors_leak() {
	let _lock = serial();
	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("out");
	let mut e = engine();
	let before = tracked_fds(dir.path());

	e.run_line(&format!("echo a | cat | cat > {}", out.display())).unwrap();
	e.run_line(&format!("echo a | ish-no-such-program | cat >> {}", out.display())).unwrap();
	e.run_line("sleep 0 | cat &").unwrap();
	assert!(e.run_line("echo a | | cat").is_err());
	assert_eq!(tracked_fds(dir.path()), before);

	thread::sleep(Duration::from_millis(300));
	e.reap_background();
	assert_eq!(tracked_fds(dir.path()), before);
}

#[test]
fn sigint_is_forwarded_to_foreground_job() {
	let _lock = serial();
	signal::install(false).unwrap();
	let mut e = engine();

	let sender = thread::spawn(|| {
		thread::sleep(Duration::from_millis(300));
		kill(getpid(), Signal::SIGINT).unwrap();
	});
	let start = Instant::now();
	let s = e.run_line("sleep 5").unwrap();
	sender.join().unwrap();

	assert_eq!(s, status(130));
	assert!(start.elapsed() < Duration::from_secs(4));
	assert_eq!(signal::foreground_pid(), None);
}

#[test]
fn foreground_stages_are_tracked_while_spawning() {
	let _lock = serial();
	let pipeline = Pipeline {
		commands: vec![
			Command { argv: vec!["sleep".to_owned(), "5".to_owned()], redirect: None },
			Command { argv: vec!["true".to_owned()], redirect: None },
		],
		is_background: false,
	};
	let plans = plan::build(&pipeline);
	let mut job_builder = JobBuilder::new(plans.len(), false, false);
	let mut guard = ForegroundGuard::new(false);
	launch::spawn(&plans, &mut job_builder, Some(&mut guard)).unwrap();

	let mut job = job_builder.build("sleep 5 | true");
	let first = job.processes[0].pid;
	assert_eq!(signal::foreground_pid(), Some(first));
	kill(first, Signal::SIGKILL).unwrap();
	job.wait().unwrap();
	drop(guard);
	assert_eq!(signal::foreground_pid(), None);
	assert_eq!(job.last_status(), Some(ExitStatus::SUCCESS));
}

#[test]
fn stopped_stage_does_not_block_the_wait() {
	let _lock = serial();
	let mut e = engine();

	let stopper = thread::spawn(|| {
		let pid = wait_for_foreground();
		thread::sleep(Duration::from_millis(100));
		kill(pid, Signal::SIGSTOP).unwrap();
	});
	let start = Instant::now();
	let s = e.run_line("sleep 1").unwrap();
	stopper.join().unwrap();

	assert_eq!(s, ExitStatus::SUCCESS);
	assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
fn process_groups_follow_job_control() {
	let _lock = serial();
	for &job_control in &[false, true] {
		let mut e = Engine::new(Options { job_control: job_control, ..Options::default() });
		let pid = match e.run_pipeline("sleep 5 &").unwrap() {
			EvalResult::Background { pid, .. } => pid,
			r => panic!("unexpected {:?}", r),
		};
		let pgid = unistd::getpgid(Some(pid)).unwrap();
		if job_control {
			assert_eq!(pgid, pid);
		} else {
			assert_eq!(pgid, unistd::getpgrp());
		}

		kill(pid, Signal::SIGKILL).unwrap();
		thread::sleep(Duration::from_millis(300));
		let done = e.reap_background();
		assert_eq!(done.len(), 1);
		assert_eq!(done[0].1.last_status(), Some(status(137)));
	}
}

#[test]
fn empty_argv_is_rejected_before_forking() {
	let _lock = serial();
	let mut e = engine();
	let pipeline = Pipeline {
		commands: vec![
			Command { argv: vec!["true".to_owned()], redirect: None },
			Command { argv: vec![], redirect: None },
		],
		is_background: false,
	};
	match e.eval(&pipeline, "true | ") {
		Err(EngineError::Parse(ParseError::EmptyCommand)) => {},
		r => panic!("unexpected {:?}", r),
	}
	assert!(e.jobs().is_empty());
	assert_eq!(e.last_status(), ExitStatus::SUCCESS);
}

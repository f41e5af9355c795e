use std::io::{self, Write};

use log::{debug, warn};
use nix::unistd::Pid;

use crate::conditional::{self, ConditionalBlock};
use crate::error::Result;
use crate::job::{Job, JobBuilder, JobSet};
use crate::launch;
use crate::parser;
use crate::plan;
use crate::signal::ForegroundGuard;
use crate::types::{ExitStatus, Pipeline};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EvalResult {
	Done(ExitStatus),
	Background { job: usize, pid: Pid },
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
	pub max_stages: usize,
	/// Hand the terminal to each foreground job while it runs.
	pub job_control: bool,
}

impl Default for Options {
	fn default() -> Options {
		Options { max_stages: parser::DEFAULT_MAX_STAGES, job_control: false }
	}
}

/// Engine state for one interactive session.
///
/// Owns the last exit status and the background job table. Runs at most one
/// foreground pipeline at a time: every operation that starts one takes
/// `&mut self` and returns only after it has been waited for.
#[derive(Debug)]
pub struct Engine {
	options: Options,
	last_status: ExitStatus,
	background: JobSet,
}

impl Default for Engine {
	fn default() -> Engine {
		Engine::new(Options::default())
	}
}

impl Engine {
	pub fn new(options: Options) -> Engine {
		Engine { options: options, last_status: ExitStatus::SUCCESS, background: JobSet::new() }
	}

	pub fn last_status(&self) -> ExitStatus {
		self.last_status
	}

	pub fn jobs(&self) -> &JobSet {
		&self.background
	}

	/// Reaps background jobs that finished since the last call.
	pub fn reap_background(&mut self) -> Vec<(usize, Job)> {
		self.background.reap()
	}

	pub fn parse(&self, line: &str) -> Result<Pipeline> {
		Ok(parser::parse_with_limit(line.trim(), self.options.max_stages)?)
	}

	fn wait_foreground(&mut self, mut job: Job, guard: Option<ForegroundGuard>) -> Result<ExitStatus> {
		let waited = job.wait();
		drop(guard);
		if let Some(status) = job.last_status() {
			self.last_status = status;
		}
		debug!("job {:?} finished with {}", job.text, self.last_status);
		waited?;
		Ok(self.last_status)
	}

	/// Spawns an already parsed pipeline and, unless it runs in the
	/// background, waits for it.
	pub fn eval(&mut self, pipeline: &Pipeline, text: &str) -> Result<EvalResult> {
		// Background children are collected here as well as at the prompt.
		self.reap_background();

		let plans = plan::build(pipeline);
		let mut job_builder = JobBuilder::new(plans.len(), pipeline.is_background, self.options.job_control);
		let mut foreground = if pipeline.is_background {
			None
		} else {
			Some(ForegroundGuard::new(self.options.job_control))
		};
		let spawned = launch::spawn(&plans, &mut job_builder, foreground.as_mut());
		if let Err(ref e) = spawned {
			warn!("pipeline {:?} failed to spawn: {}", text, e);
		}
		if job_builder.is_empty() {
			return spawned.map(|_| EvalResult::Done(self.last_status));
		}

		let job = job_builder.build(text);
		let result = if pipeline.is_background {
			let pid = job.leader();
			let n = self.background.push(job);
			debug!("[{}] {} started in background", n, pid);
			EvalResult::Background { job: n, pid: pid }
		} else {
			EvalResult::Done(self.wait_foreground(job, foreground)?)
		};
		spawned.map(|_| result)
	}

	/// Parses and runs one pipeline line.
	pub fn run_pipeline(&mut self, line: &str) -> Result<EvalResult> {
		let pipeline = self.parse(line)?;
		self.eval(&pipeline, line.trim())
	}

	/// Runs a line, reading continuation lines from `rest` when it opens an
	/// `if` block.
	pub fn execute<I>(&mut self, line: &str, rest: &mut I) -> Result<EvalResult>
		where I: Iterator<Item = String>
	{
		if conditional::is_conditional(line) {
			let block = ConditionalBlock::parse(line, rest)?;
			return self.eval_conditional(&block).map(EvalResult::Done);
		}
		self.run_pipeline(line)
	}

	/// Like [`execute`](Engine::execute), for callers that only want the status.
	pub fn run_line(&mut self, line: &str) -> Result<ExitStatus> {
		match self.execute(line, &mut std::iter::empty::<String>())? {
			EvalResult::Done(status) => Ok(status),
			EvalResult::Background { .. } => Ok(self.last_status),
		}
	}

	/// Runs the condition and then every command of the chosen branch.
	///
	/// Branch commands do not short-circuit: a failing or malformed one is
	/// reported on stderr and the next one still runs.
	pub fn eval_conditional(&mut self, block: &ConditionalBlock) -> Result<ExitStatus> {
		let condition = self.run_line(&block.condition)?;
		debug!("condition {:?} -> {}", block.condition, condition);
		let branch = if condition.success() { &block.then_branch } else { &block.else_branch };
		let mut status = condition;
		for command in branch {
			match self.run_line(command) {
				Ok(s) => status = s,
				Err(e) => {
					warn!("{:?}: {}", command, e);
					let _ = writeln!(&mut io::stderr(), "ish: {}", e);
					status = self.last_status;
				},
			}
		}
		Ok(status)
	}
}

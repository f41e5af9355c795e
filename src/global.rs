use std::collections::HashMap;
use std::io::{self, Write};

use crate::builtin;
use crate::config::Config;
use crate::error::Result;
use crate::eval::{Engine, EvalResult, Options};
use crate::history::History;
use crate::signal;
use crate::types::ExitStatus;

const REPEAT: &str = "!!";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Control { Continue, Quit }

/// Everything one interactive session owns: the engine plus the state of
/// the line-level built-ins around it.
pub struct State {
	pub engine: Engine,
	pub history: History,
	pub variables: HashMap<String, String>,
	prompt: String,
	last_command: Option<String>,
}

impl State {
	pub fn new(config: &Config, job_control: bool) -> State {
		let options = Options { max_stages: config.max_stages, job_control: job_control };
		let mut state = State {
			engine: Engine::new(options),
			history: History::new(config.history_size),
			variables: HashMap::new(),
			prompt: String::new(),
			last_command: None,
		};
		state.set_prompt(&config.prompt);
		state
	}

	pub fn prompt(&self) -> String {
		format!("{}: ", self.prompt)
	}

	pub fn set_prompt(&mut self, prompt: &str) {
		self.prompt = prompt.to_owned();
		signal::set_idle_banner(&format!("\nYou typed Control-C!\n{}", self.prompt()));
	}

	/// Prints a notice for every background job that has finished.
	pub fn report_finished(&mut self, out: &mut dyn Write) -> io::Result<()> {
		for (n, job) in self.engine.reap_background() {
			let status = job.last_status().unwrap_or_default();
			writeln!(out, "[{}] Done ({})  {}", n, status, job.text)?;
		}
		Ok(())
	}

	/// Handles one input line; `rest` supplies continuation lines for `if`
	/// blocks.
	///
	/// A line the engine rejects or fails to run is returned as the error;
	/// the session itself stays usable.
	pub fn handle_line<I>(&mut self, line: &str, rest: &mut I, out: &mut dyn Write) -> Result<Control>
		where I: Iterator<Item = String>
	{
		let line = line.trim();
		if line.is_empty() {
			return Ok(Control::Continue);
		}
		if line == "quit" || line == "exit" {
			return Ok(Control::Quit);
		}

		let line = if line == REPEAT {
			match self.last_command.clone() {
				Some(command) => {
					writeln!(out, "{}", command)?;
					command
				},
				None => {
					writeln!(out, "No previous command.")?;
					return Ok(Control::Continue);
				},
			}
		} else {
			line.to_owned()
		};
		self.history.push(&line);

		if let Some(b) = builtin::match_builtin(&line) {
			builtin::run(self, b, out)?;
			return Ok(Control::Continue);
		}

		self.last_command = Some(line.clone());
		// Children write straight to fd 1.
		out.flush()?;
		if let EvalResult::Background { job, pid } = self.engine.execute(&line, rest)? {
			writeln!(out, "[{}] {}", job, pid)?;
		}
		Ok(Control::Continue)
	}

	/// Runs a single line the way `ish -c` does and returns the status to
	/// exit with. A line that cannot be run at all fails.
	pub fn run_command<I>(&mut self, line: &str, rest: &mut I, out: &mut dyn Write) -> ExitStatus
		where I: Iterator<Item = String>
	{
		match self.handle_line(line, rest, out) {
			Ok(_) => self.engine.last_status(),
			Err(e) => {
				let _ = writeln!(&mut io::stderr(), "ish: {}", e);
				ExitStatus::FAILURE
			},
		}
	}
}

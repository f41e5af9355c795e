//! Descriptor wiring for each stage of a pipeline, decided before anything
//! is forked.

use crate::types::{Command, Pipeline};

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Input {
	Inherit,
	Pipe,
	File(String),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Output {
	Inherit,
	Pipe,
	File { path: String, append: bool },
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrOutput {
	Inherit,
	File(String),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StagePlan {
	pub argv: Vec<String>,
	pub stdin: Input,
	pub stdout: Output,
	pub stderr: ErrOutput,
}

impl StagePlan {
	pub fn name(&self) -> &str {
		self.argv.first().map_or("", String::as_str)
	}

	/// Whether a pipe to the following stage has to be created for this one.
	pub fn feeds_pipe(&self) -> bool {
		self.stdout == Output::Pipe
	}

	fn new(command: &Command, i: usize, n: usize) -> StagePlan {
		let is_first = i == 0;
		let is_last = i + 1 == n;

		// An input file on the last stage replaces the pipe from its predecessor.
		let stdin = match command.input() {
			Some(path) => Input::File(path.to_owned()),
			None if is_first => Input::Inherit,
			None => Input::Pipe,
		};
		let stdout = if !is_last {
			Output::Pipe
		} else {
			match command.output() {
				Some((path, append)) => Output::File { path: path.to_owned(), append: append },
				None => Output::Inherit,
			}
		};
		let stderr = match command.error_output() {
			Some(path) => ErrOutput::File(path.to_owned()),
			None => ErrOutput::Inherit,
		};
		StagePlan { argv: command.argv.clone(), stdin: stdin, stdout: stdout, stderr: stderr }
	}
}

pub fn build(pipeline: &Pipeline) -> Vec<StagePlan> {
	let n = pipeline.commands.len();
	pipeline.commands.iter().enumerate()
		.map(|(i, command)| StagePlan::new(command, i, n))
		.collect()
}

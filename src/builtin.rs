use std::env;
use std::io::{self, Write};

use crate::global;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Builtin<'a> {
	Cd(Option<&'a str>),
	Prompt(&'a str),
	SetVariable { name: &'a str, value: &'a str },
	EchoVariable(&'a str),
	EchoStatus,
	History,
	Jobs,
}

fn match_set_variable(line: &str) -> Option<Builtin> {
	let rest = line.strip_prefix('$')?;
	let (name, value) = rest.split_once('=')?;
	Some(Builtin::SetVariable { name: name.trim(), value: value.trim() })
}

fn match_echo(line: &str) -> Option<Builtin> {
	let mut words = line.split_whitespace();
	if words.next() != Some("echo") {
		return None;
	}
	let name = words.next()?.strip_prefix('$')?;
	if words.next().is_some() {
		return None;
	}
	match name {
		"?" => Some(Builtin::EchoStatus),
		_ => Some(Builtin::EchoVariable(name)),
	}
}

fn match_prompt(line: &str) -> Option<Builtin> {
	let rest = line.strip_prefix("prompt")?.trim_start();
	let value = rest.strip_prefix('=')?;
	Some(Builtin::Prompt(value.trim()))
}

pub fn match_builtin(line: &str) -> Option<Builtin> {
	let line = line.trim();
	match line {
		"history" => return Some(Builtin::History),
		"jobs" => return Some(Builtin::Jobs),
		_ => {},
	}
	let mut words = line.split_whitespace();
	if words.next() == Some("cd") {
		return Some(Builtin::Cd(words.next()));
	}
	match_set_variable(line).or_else(|| match_echo(line)).or_else(|| match_prompt(line))
}

fn builtin_cd(dir: Option<&str>, out: &mut dyn Write) -> io::Result<()> {
	let target = match dir {
		Some(d) => d.to_owned(),
		None => match env::var("HOME") {
			Ok(home) => home,
			Err(_) => return writeln!(out, "cd: HOME not set"),
		},
	};
	if let Err(e) = env::set_current_dir(&target) {
		writeln!(out, "cd: {}: {}", target, e)?;
	}
	Ok(())
}

pub fn run(state: &mut global::State, builtin: Builtin, out: &mut dyn Write) -> io::Result<()> {
	match builtin {
		Builtin::Cd(dir) => builtin_cd(dir, out),
		Builtin::Prompt(prompt) => {
			state.set_prompt(prompt);
			Ok(())
		},
		Builtin::SetVariable { name, value } => {
			if name.is_empty() {
				return writeln!(out, "Syntax error: missing variable name.");
			}
			state.variables.insert(name.to_owned(), value.to_owned());
			Ok(())
		},
		Builtin::EchoVariable(name) => {
			let value = state.variables.get(name).map(String::as_str).unwrap_or(name);
			writeln!(out, "{}", value)
		},
		Builtin::EchoStatus => writeln!(out, "{}", state.engine.last_status()),
		Builtin::History => {
			for (i, line) in state.history.iter().enumerate() {
				writeln!(out, "{:5}  {}", i + 1, line)?;
			}
			Ok(())
		},
		Builtin::Jobs => {
			for (n, job) in state.engine.jobs().iter() {
				writeln!(out, "[{}] {}  Running  {}", n, job.leader(), job.text)?;
			}
			Ok(())
		},
	}
}

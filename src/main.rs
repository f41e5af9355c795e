use std::fs::OpenOptions;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{warn, LevelFilter};
use simplelog::{ColorChoice, TermLogger, TerminalMode, WriteLogger};

use ish::config::Config;
use ish::global::{Control, State};
use ish::signal;

const CONTINUATION_PROMPT: &str = "> ";

#[derive(Parser, Debug)]
#[command(name = "ish", version, about = "A small interactive shell")]
struct Cli {
	/// Configuration file (default: ~/.config/ish/config.toml)
	#[arg(long)]
	config: Option<PathBuf>,

	/// Log at debug level
	#[arg(short, long)]
	verbose: bool,

	/// Run one command line and exit with its status
	#[arg(short = 'c', value_name = "COMMAND")]
	command: Option<String>,
}

fn init_logging(config: &Config, verbose: bool) {
	let level = if verbose { LevelFilter::Debug } else { config.level_filter() };
	let log_config = simplelog::Config::default();
	if let Some(ref path) = config.log_file {
		match OpenOptions::new().create(true).append(true).open(path) {
			Ok(file) => {
				let _ = WriteLogger::init(level, log_config, file);
				return;
			},
			Err(e) => eprintln!("ish: cannot open log file {}: {}", path.display(), e),
		}
	}
	let _ = TermLogger::init(level, log_config, TerminalMode::Stderr, ColorChoice::Auto);
}

struct Input<'a> {
	stdin: io::StdinLock<'a>,
	interactive: bool,
}

impl<'a> Input<'a> {
	/// Reads one line without its trailing newline; `None` on end of input.
	fn read_line(&mut self, prompt: &str) -> Option<String> {
		if self.interactive {
			let mut stdout = io::stdout();
			let _ = stdout.write_all(prompt.as_bytes());
			let _ = stdout.flush();
		}
		let mut line = String::new();
		match self.stdin.read_line(&mut line) {
			Ok(0) => None,
			Ok(_) => {
				let len = line.trim_end_matches(&['\n', '\r'][..]).len();
				line.truncate(len);
				Some(line)
			},
			Err(e) => {
				warn!("read error: {}", e);
				None
			},
		}
	}
}

/// Continuation lines of an `if` block.
struct Continuation<'i, 'a>(&'i mut Input<'a>);

impl<'i, 'a> Iterator for Continuation<'i, 'a> {
	type Item = String;

	fn next(&mut self) -> Option<String> {
		self.0.read_line(CONTINUATION_PROMPT)
	}
}

fn run_command(state: &mut State, command: &str, input: &mut Input) -> i32 {
	let mut stdout = io::stdout();
	let status = state.run_command(command, &mut Continuation(&mut *input), &mut stdout);
	let _ = stdout.flush();
	status.code() as i32
}

fn repl(state: &mut State, input: &mut Input) {
	let mut stdout = io::stdout();
	loop {
		let _ = state.report_finished(&mut stdout);
		let line = match input.read_line(&state.prompt()) {
			Some(line) => line,
			None => {
				if input.interactive {
					println!();
				}
				break;
			},
		};
		match state.handle_line(&line, &mut Continuation(&mut *input), &mut stdout) {
			Ok(Control::Continue) => {},
			Ok(Control::Quit) => break,
			Err(e) => eprintln!("ish: {}", e),
		}
		let _ = stdout.flush();
	}
}

fn main() {
	let cli = Cli::parse();

	let config = match Config::load(cli.config.as_deref()) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("ish: {}", e);
			Config::default()
		},
	};
	init_logging(&config, cli.verbose);

	let stdin = io::stdin();
	let interactive = stdin.is_terminal() && cli.command.is_none();
	let job_control = config.job_control.enabled(stdin.is_terminal());
	if let Err(e) = signal::install(job_control) {
		warn!("cannot install signal handlers: {}", e);
	}

	let mut state = State::new(&config, job_control);
	let mut input = Input { stdin: stdin.lock(), interactive: interactive };
	match cli.command {
		Some(ref command) => process::exit(run_command(&mut state, command, &mut input)),
		None => repl(&mut state, &mut input),
	}
}

use crate::error::ParseError;
use crate::types::*;

pub type ParseResult<T> = Result<T, ParseError>;

pub const DEFAULT_MAX_STAGES: usize = 256;

const PIPE: char = '|';
const BACKGROUND: &str = "&";

struct Parser<'a> {
	line: &'a str,
	max_stages: usize,
}

impl<'a> Parser<'a> {
	fn split_stages(&self) -> ParseResult<Vec<&'a str>> {
		let stages: Vec<&'a str> = self.line.split(PIPE).collect();
		if stages.len() > self.max_stages {
			return Err(ParseError::TooManyStages { limit: self.max_stages });
		}
		if stages.iter().any(|s| s.trim().is_empty()) {
			return Err(ParseError::EmptyStage);
		}
		Ok(stages)
	}

	fn read_words(stage: &'a str) -> Vec<String> {
		stage.split_whitespace().map(str::to_owned).collect()
	}

	// Only the first operator is honoured; anything after it stays in argv.
	fn parse_redirect(argv: &mut Vec<String>) -> ParseResult<Option<Redirect>> {
		let found = argv.iter().enumerate()
			.find_map(|(i, w)| RedirectType::from_operator(w).map(|typ| (i, typ)));
		let (i, typ) = match found {
			Some(f) => f,
			None => return Ok(None),
		};
		if i + 1 >= argv.len() {
			return Err(ParseError::MissingRedirectTarget { operator: typ.operator() });
		}
		let target = argv.remove(i + 1);
		argv.remove(i);
		Ok(Some(Redirect { target: target, typ: typ }))
	}

	fn parse_command(stage: &'a str, is_last: bool, is_background: &mut bool) -> ParseResult<Command> {
		let mut argv = Parser::read_words(stage);
		let mut redirect = None;
		if is_last {
			redirect = Parser::parse_redirect(&mut argv)?;
			if argv.last().map(String::as_str) == Some(BACKGROUND) {
				argv.pop();
				*is_background = true;
			}
		}
		if argv.is_empty() {
			return Err(ParseError::EmptyCommand);
		}
		Ok(Command { argv: argv, redirect: redirect })
	}

	fn parse_pipeline(&mut self) -> ParseResult<Pipeline> {
		let stages = self.split_stages()?;
		let last = stages.len() - 1;
		let mut is_background = false;
		let commands = stages.iter().enumerate()
			.map(|(i, stage)| Parser::parse_command(stage, i == last, &mut is_background))
			.collect::<ParseResult<Vec<Command>>>()?;
		Ok(Pipeline { commands: commands, is_background: is_background })
	}
}

/// Parses one trimmed, non-empty command line into a pipeline.
pub fn parse(line: &str) -> ParseResult<Pipeline> {
	parse_with_limit(line, DEFAULT_MAX_STAGES)
}

pub fn parse_with_limit(line: &str, max_stages: usize) -> ParseResult<Pipeline> {
	let mut parser = Parser { line: line, max_stages: max_stages };
	parser.parse_pipeline()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn argv(cmd: &Command) -> Vec<&str> {
		cmd.argv.iter().map(String::as_str).collect()
	}

	#[test]
	fn single_command() {
		let p = parse("ls  -l\t/tmp").unwrap();
		assert_eq!(p.commands.len(), 1);
		assert_eq!(argv(&p.commands[0]), ["ls", "-l", "/tmp"]);
		assert_eq!(p.commands[0].redirect, None);
		assert!(!p.is_background);
	}

	#[test]
	fn pipeline_stages() {
		let p = parse("cat f | grep x | wc -l").unwrap();
		assert_eq!(p.commands.len(), 3);
		assert_eq!(argv(&p.commands[1]), ["grep", "x"]);
		assert_eq!(argv(&p.commands[2]), ["wc", "-l"]);
	}

	#[test]
	fn pipe_without_spaces() {
		let p = parse("echo hi|tr h H").unwrap();
		assert_eq!(argv(&p.commands[0]), ["echo", "hi"]);
		assert_eq!(argv(&p.commands[1]), ["tr", "h", "H"]);
	}

	#[test]
	fn empty_stage() {
		assert_eq!(parse("| ls"), Err(ParseError::EmptyStage));
		assert_eq!(parse("ls |"), Err(ParseError::EmptyStage));
		assert_eq!(parse("ls || wc"), Err(ParseError::EmptyStage));
		assert_eq!(parse("ls |   | wc"), Err(ParseError::EmptyStage));
	}

	#[test]
	fn redirections() {
		let p = parse("echo a > out.txt").unwrap();
		assert_eq!(argv(&p.commands[0]), ["echo", "a"]);
		assert_eq!(p.commands[0].output(), Some(("out.txt", false)));

		let p = parse("echo a >> out.txt").unwrap();
		assert_eq!(p.commands[0].output(), Some(("out.txt", true)));

		let p = parse("ls nothere 2> err.txt").unwrap();
		assert_eq!(p.commands[0].error_output(), Some("err.txt"));
		assert_eq!(p.commands[0].output(), None);

		let p = parse("sort < in.txt").unwrap();
		assert_eq!(p.commands[0].input(), Some("in.txt"));
		assert_eq!(argv(&p.commands[0]), ["sort"]);
	}

	#[test]
	fn only_first_redirection_is_honoured() {
		let p = parse("sort < in.txt > out.txt").unwrap();
		assert_eq!(p.commands[0].input(), Some("in.txt"));
		assert_eq!(p.commands[0].output(), None);
		assert_eq!(argv(&p.commands[0]), ["sort", ">", "out.txt"]);
	}

	#[test]
	fn redirection_only_on_last_stage() {
		let p = parse("echo a > x | cat > y").unwrap();
		assert_eq!(argv(&p.commands[0]), ["echo", "a", ">", "x"]);
		assert_eq!(p.commands[0].redirect, None);
		assert_eq!(p.commands[1].output(), Some(("y", false)));
	}

	#[test]
	fn missing_redirect_target() {
		assert_eq!(parse("ls >"), Err(ParseError::MissingRedirectTarget { operator: ">" }));
		assert_eq!(parse("cat <"), Err(ParseError::MissingRedirectTarget { operator: "<" }));
	}

	#[test]
	fn background() {
		let p = parse("sleep 1 &").unwrap();
		assert!(p.is_background);
		assert_eq!(argv(&p.commands[0]), ["sleep", "1"]);

		let p = parse("yes | head -n 3 > out &").unwrap();
		assert!(p.is_background);
		assert_eq!(p.commands[1].output(), Some(("out", false)));
		assert_eq!(argv(&p.commands[1]), ["head", "-n", "3"]);

		let p = parse("echo a&").unwrap();
		assert!(!p.is_background);
		assert_eq!(argv(&p.commands[0]), ["echo", "a&"]);
	}

	#[test]
	fn empty_command() {
		assert_eq!(parse("&"), Err(ParseError::EmptyCommand));
		assert_eq!(parse("> out"), Err(ParseError::EmptyCommand));
		assert_eq!(parse("ls | &"), Err(ParseError::EmptyCommand));
	}

	#[test]
	fn too_many_stages() {
		assert_eq!(parse_with_limit("a | b | c", 2), Err(ParseError::TooManyStages { limit: 2 }));
		assert!(parse_with_limit("a | b", 2).is_ok());
	}

	#[test]
	fn parsing_is_repeatable() {
		let line = "cat < in | sort -r &";
		assert_eq!(parse(line), parse(line));
	}
}

//! `if … then … [else …] fi` blocks.
//!
//! Only the block's shape is parsed here; the condition and every branch
//! command stay as text and are run later by [`Engine`](crate::eval::Engine)
//! through the ordinary pipeline path.

use log::warn;

use crate::error::SyntaxError;

const IF: &str = "if";
const THEN: &str = "then";
const ELSE: &str = "else";
const FI: &str = "fi";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Phase { ExpectThen, CollectThen, CollectElseOrFi, Done }

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ConditionalBlock {
	pub condition: String,
	pub then_branch: Vec<String>,
	pub else_branch: Vec<String>,
}

/// Whether a line opens a conditional block.
pub fn is_conditional(line: &str) -> bool {
	line.split_whitespace().next() == Some(IF)
}

impl ConditionalBlock {
	fn branch(&mut self, phase: Phase) -> &mut Vec<String> {
		if phase == Phase::CollectElseOrFi { &mut self.else_branch } else { &mut self.then_branch }
	}

	fn flush(&mut self, phase: Phase, words: &mut Vec<&str>) {
		if !words.is_empty() {
			let command = words.join(" ");
			self.branch(phase).push(command);
			words.clear();
		}
	}

	/// Keywords given on the same line as `then`: each run of words between
	/// them is one command.
	fn feed_words(&mut self, words: &[&str], phase: &mut Phase) {
		let mut command: Vec<&str> = vec![];
		for (i, &word) in words.iter().enumerate() {
			match word {
				ELSE if *phase == Phase::CollectThen => {
					self.flush(*phase, &mut command);
					*phase = Phase::CollectElseOrFi;
				},
				FI => {
					self.flush(*phase, &mut command);
					*phase = Phase::Done;
					if i + 1 < words.len() {
						warn!("ignoring words after 'fi': {}", words[i + 1 ..].join(" "));
					}
					return;
				},
				_ => command.push(word),
			}
		}
		self.flush(*phase, &mut command);
	}

	fn feed_line(&mut self, line: &str, phase: &mut Phase) {
		let line = line.trim();
		match line {
			ELSE if *phase == Phase::CollectThen => *phase = Phase::CollectElseOrFi,
			FI => *phase = Phase::Done,
			"" => {},
			_ => self.branch(*phase).push(line.to_owned()),
		}
	}

	/// Parses a block whose first line is `first`, pulling further lines from
	/// `rest` until the closing `fi`.
	///
	/// On error the lines consumed so far are discarded.
	pub fn parse<I>(first: &str, rest: &mut I) -> Result<ConditionalBlock, SyntaxError>
		where I: Iterator<Item = String>
	{
		let mut words = first.split_whitespace();
		if words.next() != Some(IF) {
			return Err(SyntaxError::MissingIf);
		}

		let mut block = ConditionalBlock::default();
		let mut phase = Phase::ExpectThen;
		let mut condition: Vec<&str> = vec![];
		for word in words.by_ref() {
			if word == THEN {
				phase = Phase::CollectThen;
				break;
			}
			condition.push(word);
		}
		block.condition = condition.join(" ");

		let mut inline: Vec<String> = words.map(str::to_owned).collect();
		if phase == Phase::ExpectThen {
			let line = rest.next().ok_or(SyntaxError::MissingThen)?;
			let mut words = line.split_whitespace();
			if words.next() != Some(THEN) {
				return Err(SyntaxError::MissingThen);
			}
			inline = words.map(str::to_owned).collect();
			phase = Phase::CollectThen;
		}
		let inline: Vec<&str> = inline.iter().map(String::as_str).collect();
		block.feed_words(&inline, &mut phase);

		while phase != Phase::Done {
			let line = rest.next().ok_or(SyntaxError::MissingFi)?;
			block.feed_line(&line, &mut phase);
		}
		Ok(block)
	}
}

use std::collections::VecDeque;

/// The most recent command lines, oldest first.
#[derive(Debug)]
pub struct History {
	lines: VecDeque<String>,
	capacity: usize,
}

impl History {
	pub fn new(capacity: usize) -> History {
		History { lines: VecDeque::with_capacity(capacity), capacity: capacity }
	}

	pub fn push(&mut self, line: &str) {
		if self.capacity == 0 {
			return;
		}
		if self.lines.len() == self.capacity {
			self.lines.pop_front();
		}
		self.lines.push_back(line.to_owned());
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.lines.iter().map(String::as_str)
	}
}

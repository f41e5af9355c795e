use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectType { Input, Output, Append, Error }

impl RedirectType {
	pub fn from_operator(op: &str) -> Option<RedirectType> {
		match op {
			"<" => Some(RedirectType::Input),
			">" => Some(RedirectType::Output),
			">>" => Some(RedirectType::Append),
			"2>" => Some(RedirectType::Error),
			_ => None,
		}
	}

	pub fn operator(self) -> &'static str {
		match self {
			RedirectType::Input => "<",
			RedirectType::Output => ">",
			RedirectType::Append => ">>",
			RedirectType::Error => "2>",
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Redirect {
	pub target: String,
	pub typ: RedirectType,
}

/// One program invocation of a pipeline.
///
/// A command carries at most one redirection, and only the last command of a
/// pipeline ever has one.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Command {
	pub argv: Vec<String>,
	pub redirect: Option<Redirect>,
}

impl Command {
	fn redirect_of(&self, typ: RedirectType) -> Option<&Redirect> {
		self.redirect.as_ref().filter(|r| r.typ == typ)
	}

	/// Output target and whether it is opened for appending.
	pub fn output(&self) -> Option<(&str, bool)> {
		self.redirect_of(RedirectType::Output).map(|r| (r.target.as_str(), false))
			.or_else(|| self.redirect_of(RedirectType::Append).map(|r| (r.target.as_str(), true)))
	}

	pub fn error_output(&self) -> Option<&str> {
		self.redirect_of(RedirectType::Error).map(|r| r.target.as_str())
	}

	pub fn input(&self) -> Option<&str> {
		self.redirect_of(RedirectType::Input).map(|r| r.target.as_str())
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pipeline {
	pub commands: Vec<Command>,
	pub is_background: bool,
}

/// Status reported for a finished pipeline: the exit code of a normal exit,
/// or `128 + signal` when the last stage was killed by a signal.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, Hash)]
pub struct ExitStatus(u8);

impl ExitStatus {
	pub const SUCCESS: ExitStatus = ExitStatus(0);
	pub const FAILURE: ExitStatus = ExitStatus(1);
	pub const NOT_FOUND: ExitStatus = ExitStatus(127);

	pub fn from_code(code: u8) -> ExitStatus {
		ExitStatus(code)
	}

	pub fn from_signal(signo: i32) -> ExitStatus {
		ExitStatus((128 + signo).clamp(0, 255) as u8)
	}

	pub fn code(self) -> u8 {
		self.0
	}

	pub fn success(self) -> bool {
		self.0 == 0
	}
}

impl fmt::Display for ExitStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

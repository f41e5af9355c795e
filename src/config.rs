use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

use crate::parser::DEFAULT_MAX_STAGES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobControl {
	#[default]
	Auto,
	On,
	Off,
}

impl JobControl {
	pub fn enabled(self, stdin_is_terminal: bool) -> bool {
		match self {
			JobControl::Auto => stdin_is_terminal,
			JobControl::On => true,
			JobControl::Off => false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub prompt: String,
	pub history_size: usize,
	pub max_stages: usize,
	pub job_control: JobControl,
	pub log_level: String,
	pub log_file: Option<PathBuf>,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			prompt: "hello".to_owned(),
			history_size: 20,
			max_stages: DEFAULT_MAX_STAGES,
			job_control: JobControl::Auto,
			log_level: "warn".to_owned(),
			log_file: None,
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read {path}: {source}")]
	Read { path: PathBuf, source: io::Error },
	#[error("cannot parse {path}: {source}")]
	Parse { path: PathBuf, source: toml::de::Error },
}

impl Config {
	/// `$HOME/.config/ish/config.toml`.
	pub fn user_path() -> Option<PathBuf> {
		let home = env::var_os("HOME")?;
		Some(Path::new(&home).join(".config/ish/config.toml"))
	}

	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		let content = fs::read_to_string(path)
			.map_err(|e| ConfigError::Read { path: path.to_owned(), source: e })?;
		toml::from_str(&content)
			.map_err(|e| ConfigError::Parse { path: path.to_owned(), source: e })
	}

	/// Loads the explicit file if given, else the user file if it exists.
	/// Keys missing from the file keep their defaults.
	pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
		match explicit {
			Some(path) => Config::from_file(path),
			None => match Config::user_path() {
				Some(ref path) if path.exists() => Config::from_file(path),
				_ => Ok(Config::default()),
			},
		}
	}

	pub fn level_filter(&self) -> LevelFilter {
		LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Warn)
	}
}

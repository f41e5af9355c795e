//! ish: a small interactive shell.
//!
//! A command line goes through [`parser`] into a [`types::Pipeline`],
//! [`plan`] decides each stage's descriptor wiring, [`launch`] forks and
//! execs the stages, and [`job`] waits for them and turns the last stage's
//! wait status into an [`types::ExitStatus`]. [`eval::Engine`] ties these
//! together and also runs `if … then … else … fi` blocks from
//! [`conditional`] through the same path.

pub mod builtin;
pub mod conditional;
pub mod config;
pub mod error;
pub mod eval;
pub mod global;
pub mod history;
pub mod job;
pub mod launch;
pub mod parser;
pub mod plan;
pub mod signal;
pub mod types;

#[cfg(test)]
mod test;

pub use error::{EngineError, ParseError, SyntaxError};
pub use eval::{Engine, EvalResult, Options};
pub use types::ExitStatus;

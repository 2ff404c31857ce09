//! Running external programs.
//!
//! Pipeline code only sees the [`CommandRunner`] trait so tests can swap
//! in a fake; [`SystemRunner`] is the real process-spawning implementation.

mod command;
mod error;
mod runner;

pub use command::{Command, CommandOutput};
pub use error::{Error, Result};
pub use runner::{CommandRunner, SystemRunner, require};

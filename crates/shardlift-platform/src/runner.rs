use std::path::PathBuf;

use crate::command::{Command, CommandOutput};
use crate::error::{Error, Result};

/// Capability to run external programs.
///
/// A non-zero exit is not an error at this level: it comes back as a
/// [`CommandOutput`] for the caller to inspect. `Err` means the program
/// could not be run at all.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &Command) -> Result<CommandOutput>;

    /// Resolve a program name on the execution host.
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Runs commands as child processes of the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &Command) -> Result<CommandOutput> {
        tracing::debug!(command = %command, "running external command");
        let output = command.to_std().output().map_err(|e| Error::CommandFailed {
            cmd: command.program().to_string(),
            source: e,
        })?;
        Ok(output.into())
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Fail with [`Error::CommandNotFound`] unless `program` is available.
pub fn require<R: CommandRunner + ?Sized>(runner: &R, program: &str) -> Result<PathBuf> {
    runner.locate(program).ok_or_else(|| Error::CommandNotFound {
        cmd: program.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_missing_program() {
        let result = require(&SystemRunner, "shardlift_definitely_missing_12345");
        assert!(matches!(result, Err(Error::CommandNotFound { .. })));
    }

    #[test]
    fn test_run_missing_program_is_error() {
        let result = SystemRunner.run(&Command::new("shardlift_definitely_missing_12345"));
        assert!(matches!(result, Err(Error::CommandFailed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_exit_code_and_streams() {
        let out = SystemRunner
            .run(&Command::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_in_directory() {
        let dir = std::env::temp_dir();
        let out = SystemRunner.run(&Command::new("pwd").current_dir(&dir)).unwrap();
        assert!(out.success());
        let reported = PathBuf::from(out.stdout.trim()).canonicalize().unwrap();
        assert_eq!(reported, dir.canonicalize().unwrap());
    }
}

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// Description of one program invocation.
///
/// This is data only; a [`CommandRunner`](crate::CommandRunner) decides how
/// to execute it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub(crate) fn to_std(&self) -> std::process::Command {
        let mut inner = std::process::Command::new(&self.program);
        inner.args(&self.args);
        if let Some(dir) = &self.cwd {
            inner.current_dir(dir);
        }
        inner
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The most useful diagnostic: trimmed stderr, or stdout if stderr is empty.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() { self.stdout.trim() } else { stderr }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_new() {
        let cmd = Command::new("tar");
        assert_eq!(cmd.program(), "tar");
        assert!(cmd.get_args().is_empty());
    }

    #[test]
    fn test_command_args() {
        let cmd = Command::new("tar").arg("-xf").args(["a.tar", "-C", "/tmp/x"]);
        assert_eq!(cmd.get_args().len(), 4);
    }

    #[test]
    fn test_command_current_dir() {
        let cmd = Command::new("gcloud").current_dir("/work");
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/work")));
        assert_eq!(cmd.to_std().get_current_dir(), Some(Path::new("/work")));
    }

    #[test]
    fn test_command_display() {
        let cmd = Command::new("gcloud").args(["storage", "cp", "-r", "."]);
        assert_eq!(cmd.to_string(), "gcloud storage cp -r .");
    }

    #[test]
    fn test_output_success() {
        let ok = CommandOutput {
            code: Some(0),
            ..Default::default()
        };
        let killed = CommandOutput::default();
        assert!(ok.success());
        assert!(!killed.success());
    }

    #[test]
    fn test_output_diagnostic_prefers_stderr() {
        let out = CommandOutput {
            code: Some(2),
            stdout: "progress\n".into(),
            stderr: "  tar: Error is not recoverable\n".into(),
        };
        assert_eq!(out.diagnostic(), "tar: Error is not recoverable");

        let quiet = CommandOutput {
            code: Some(1),
            stdout: "only stdout\n".into(),
            stderr: String::new(),
        };
        assert_eq!(quiet.diagnostic(), "only stdout");
    }
}

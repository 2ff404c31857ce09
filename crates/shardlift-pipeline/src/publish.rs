use std::path::Path;
use std::sync::Arc;

use shardlift_platform::{Command, CommandRunner};

use crate::error::PublishError;

pub const DEFAULT_COPY_PROGRAM: &str = "gcloud";

/// Copies local data to a remote prefix.
///
/// Publishing the same directory twice must be safe; overwriting is fine.
pub trait Publisher: Send + Sync {
    /// Copy the contents of `local_dir`, not the directory itself.
    fn publish(&self, local_dir: &Path, destination_uri: &str) -> Result<(), PublishError>;

    /// Copy a single file into `destination_uri`.
    fn publish_file(&self, file: &Path, destination_uri: &str) -> Result<(), PublishError>;

    /// External program this publisher needs on `PATH`, if any.
    fn required_program(&self) -> Option<&str> {
        None
    }
}

fn copy_dir_command(program: &str, local_dir: &Path, destination_uri: &str) -> Command {
    Command::new(program)
        .args(["storage", "cp", "-r", "."])
        .arg(destination_uri)
        .current_dir(local_dir)
}

fn copy_file_command(program: &str, file: &Path, destination_uri: &str) -> Command {
    Command::new(program)
        .args(["storage", "cp"])
        .arg(file)
        .arg(destination_uri)
}

/// Uploads with `gcloud storage cp`.
pub struct GcloudPublisher {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl GcloudPublisher {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: DEFAULT_COPY_PROGRAM.to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn execute(&self, command: &Command, destination_uri: &str) -> Result<(), PublishError> {
        let output = self.runner.run(command)?;
        if !output.success() {
            return Err(PublishError::Failed {
                destination: destination_uri.to_string(),
                code: output.code,
                diagnostic: output.diagnostic().to_string(),
            });
        }
        Ok(())
    }
}

impl Publisher for GcloudPublisher {
    fn publish(&self, local_dir: &Path, destination_uri: &str) -> Result<(), PublishError> {
        self.execute(&copy_dir_command(&self.program, local_dir, destination_uri), destination_uri)
    }

    fn publish_file(&self, file: &Path, destination_uri: &str) -> Result<(), PublishError> {
        self.execute(&copy_file_command(&self.program, file, destination_uri), destination_uri)
    }

    fn required_program(&self) -> Option<&str> {
        Some(&self.program)
    }
}

/// Logs the copy it would run and reports success.
#[derive(Clone, Debug)]
pub struct DryRunPublisher {
    program: String,
}

impl Default for DryRunPublisher {
    fn default() -> Self {
        Self {
            program: DEFAULT_COPY_PROGRAM.to_string(),
        }
    }
}

impl Publisher for DryRunPublisher {
    fn publish(&self, local_dir: &Path, destination_uri: &str) -> Result<(), PublishError> {
        let command = copy_dir_command(&self.program, local_dir, destination_uri);
        tracing::info!(%command, cwd = %local_dir.display(), "dry run, skipping upload");
        Ok(())
    }

    fn publish_file(&self, file: &Path, destination_uri: &str) -> Result<(), PublishError> {
        let command = copy_file_command(&self.program, file, destination_uri);
        tracing::info!(%command, "dry run, skipping upload");
        Ok(())
    }
}

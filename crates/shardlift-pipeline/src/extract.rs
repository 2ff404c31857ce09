use std::fmt;
use std::path::Path;
use std::sync::Arc;

use shardlift_archive::{ArchiveManifest, Compression};
use shardlift_fs::Workspace;
use shardlift_platform::{Command, CommandRunner};

use crate::error::ExtractionError;

pub const DEFAULT_TAR_PROGRAM: &str = "tar";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionMethod {
    SystemTar,
    InProcess,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SystemTar => "system tar",
            Self::InProcess => "in-process",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionReport {
    pub method: ExtractionMethod,
    /// `None` when only the system tar could read the archive.
    pub compression: Option<Compression>,
    /// Members written to disk, not counting the archive root or special files.
    pub entry_count: usize,
    pub total_bytes: u64,
}

impl ExtractionReport {
    fn new(method: ExtractionMethod, manifest: &ArchiveManifest) -> Self {
        Self {
            method,
            compression: Some(manifest.compression),
            entry_count: manifest.entry_count(),
            total_bytes: manifest.total_bytes(),
        }
    }

    /// Count what the system tar left in `root`.
    fn from_tree(root: &Path) -> std::io::Result<Self> {
        let mut entry_count = 0;
        let mut total_bytes = 0;
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let file_type = entry.file_type()?;
                entry_count += 1;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    total_bytes += entry.metadata()?.len();
                }
            }
        }

        Ok(Self {
            method: ExtractionMethod::SystemTar,
            compression: None,
            entry_count,
            total_bytes,
        })
    }
}

/// Result of running the external extractor once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attempt {
    Completed,
    /// The program ran and exited non-zero, or was killed.
    Failed { code: Option<i32>, diagnostic: String },
    /// The program could not be started.
    Unavailable(String),
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed { code: Some(code), diagnostic } => write!(f, "exit {code}: {diagnostic}"),
            Self::Failed { code: None, diagnostic } => write!(f, "killed by signal: {diagnostic}"),
            Self::Unavailable(reason) => write!(f, "could not start: {reason}"),
        }
    }
}

/// Two-stage extraction into a job workspace.
///
/// Every archive is first scanned in-process; a member or link that would
/// land outside the workspace fails the job before anything is written.
/// The primary stage then runs the system `tar`. If that attempt does not
/// complete, the workspace is cleared and the in-process extractor runs
/// exactly once against the already validated manifest.
///
/// An archive the in-process reader cannot parse at all is handed to the
/// system `tar` alone, and its output is checked for escaping links.
pub struct ExtractionStrategy {
    runner: Option<Arc<dyn CommandRunner>>,
    tar_program: String,
}

impl ExtractionStrategy {
    /// System `tar` first, in-process on failure.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner: Some(runner),
            tar_program: DEFAULT_TAR_PROGRAM.to_string(),
        }
    }

    /// Skip the external stage entirely.
    pub fn in_process() -> Self {
        Self {
            runner: None,
            tar_program: DEFAULT_TAR_PROGRAM.to_string(),
        }
    }

    pub fn with_tar_program(mut self, program: impl Into<String>) -> Self {
        self.tar_program = program.into();
        self
    }

    pub fn tar_program(&self) -> Option<&str> {
        self.runner.as_ref().map(|_| self.tar_program.as_str())
    }

    pub fn extract(&self, archive: &Path, workspace: &Workspace) -> Result<ExtractionReport, ExtractionError> {
        let manifest = match shardlift_archive::scan(archive, workspace.path()) {
            Ok(manifest) => manifest,
            Err(e) => return self.unscannable(archive, workspace, e),
        };
        tracing::debug!(
            members = manifest.members.len(),
            bytes = manifest.total_bytes(),
            compression = manifest.compression.name(),
            "archive scanned"
        );

        let Some(runner) = &self.runner else {
            return self.fallback(archive, &manifest);
        };

        let attempt = self.primary(runner.as_ref(), archive, &manifest.destination);
        if attempt.succeeded() {
            // The system tar does its own path checks; links chained through
            // other links are only visible on disk.
            if let Err(e) = shardlift_archive::verify_links(&manifest.destination) {
                workspace.clear()?;
                return Err(e.into());
            }
            return Ok(ExtractionReport::new(ExtractionMethod::SystemTar, &manifest));
        }

        tracing::warn!(archive = %archive.display(), %attempt, "system tar failed, retrying in-process");
        workspace.clear()?;
        self.fallback(archive, &manifest)
    }

    /// The scan failed. Only unreadable formats go on to the system tar;
    /// the in-process fallback would hit the same error.
    fn unscannable(
        &self,
        archive: &Path,
        workspace: &Workspace,
        error: shardlift_archive::Error,
    ) -> Result<ExtractionReport, ExtractionError> {
        let readable_elsewhere = matches!(
            error,
            shardlift_archive::Error::Corrupted { .. } | shardlift_archive::Error::UnsupportedFormat(_)
        );
        let Some(runner) = self.runner.as_ref().filter(|_| readable_elsewhere) else {
            return Err(error.into());
        };

        tracing::warn!(archive = %archive.display(), %error, "in-process reader failed, trying system tar alone");
        let attempt = self.primary(runner.as_ref(), archive, workspace.path());
        if !attempt.succeeded() {
            tracing::warn!(archive = %archive.display(), %attempt, "system tar failed too");
            workspace.clear()?;
            return Err(error.into());
        }

        if let Err(e) = shardlift_archive::verify_links(workspace.path()) {
            workspace.clear()?;
            return Err(e.into());
        }
        ExtractionReport::from_tree(workspace.path()).map_err(|e| shardlift_archive::Error::from(e).into())
    }

    fn primary(&self, runner: &dyn CommandRunner, archive: &Path, destination: &Path) -> Attempt {
        let command = Command::new(&self.tar_program)
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg(destination);

        match runner.run(&command) {
            Ok(output) if output.success() => Attempt::Completed,
            Ok(output) => Attempt::Failed {
                code: output.code,
                diagnostic: output.diagnostic().to_string(),
            },
            Err(e) => Attempt::Unavailable(e.to_string()),
        }
    }

    fn fallback(&self, archive: &Path, manifest: &ArchiveManifest) -> Result<ExtractionReport, ExtractionError> {
        shardlift_archive::extract_manifest(archive, manifest)?;
        Ok(ExtractionReport::new(ExtractionMethod::InProcess, manifest))
    }
}

impl fmt::Debug for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionStrategy")
            .field("tar_program", &self.tar_program())
            .finish()
    }
}

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a run before or outside any single job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no archives to process")]
    NoMatch,

    #[error("required program '{program}' was not found on PATH")]
    PrerequisiteMissing { program: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("staging root unavailable: {0}")]
    Staging(#[from] shardlift_fs::Error),

    #[error("failed to start worker runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Command(#[from] shardlift_platform::Error),

    #[error("copy to '{destination}' failed: {diagnostic}")]
    Failed {
        destination: String,
        /// `None` when the copy tool was killed by a signal.
        code: Option<i32>,
        diagnostic: String,
    },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Archive(#[from] shardlift_archive::Error),

    #[error(transparent)]
    Workspace(#[from] shardlift_fs::Error),
}

impl ExtractionError {
    pub fn is_traversal(&self) -> bool {
        matches!(self, Self::Archive(e) if e.is_traversal())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Extraction,
    PathTraversal,
    Publish,
    Workspace,
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extraction => "extraction",
            Self::PathTraversal => "path traversal",
            Self::Publish => "publish",
            Self::Workspace => "workspace",
            Self::Panicked => "panicked",
        })
    }
}

/// Why one job failed. Never escapes the job that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ExtractionError> for JobFailure {
    fn from(e: ExtractionError) -> Self {
        let kind = match &e {
            _ if e.is_traversal() => FailureKind::PathTraversal,
            ExtractionError::Archive(_) => FailureKind::Extraction,
            ExtractionError::Workspace(_) => FailureKind::Workspace,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<PublishError> for JobFailure {
    fn from(e: PublishError) -> Self {
        Self::new(FailureKind::Publish, e.to_string())
    }
}

impl From<shardlift_fs::Error> for JobFailure {
    fn from(e: shardlift_fs::Error) -> Self {
        Self::new(FailureKind::Workspace, e.to_string())
    }
}

/// A failure attached to the archive it came from.
pub type FailedJob = (PathBuf, JobFailure);

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported archive compression: {0}")]
    UnsupportedFormat(&'static str),

    #[error("path traversal: entry '{entry}' resolves outside the destination ('{resolved}')")]
    PathTraversal { entry: PathBuf, resolved: PathBuf },

    #[error("path traversal: link '{entry}' points outside the destination ('{target}')")]
    LinkEscape { entry: PathBuf, target: PathBuf },

    #[error("entry path is not usable: '{entry}'")]
    InvalidPath { entry: PathBuf },

    #[error("failed to open archive '{path}': {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("archive '{path}' is unreadable or corrupted: {source}")]
    Corrupted { path: PathBuf, source: io::Error },

    #[error("failed to extract '{path}': {source}")]
    ExtractionFailed { path: PathBuf, source: io::Error },

    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("failed to create link '{link}' -> '{target}': {source}")]
    LinkCreationFailed {
        target: PathBuf,
        link: PathBuf,
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the archive tried to write outside its destination.
    pub fn is_traversal(&self) -> bool {
        matches!(self, Self::PathTraversal { .. } | Self::LinkEscape { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

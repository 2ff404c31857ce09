use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no matching files found for '{pattern}'")]
    NoMatch { pattern: String },

    #[error("invalid search pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("'{path}' is not under source root '{root}'")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("invalid destination '{0}': expected <scheme>://<bucket>[/prefix]")]
    InvalidDestination(String),

    #[error("invalid dataset id '{0}': expected <owner>/<name>")]
    InvalidDataset(String),

    #[error("hub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("hub returned {status} for {url}")]
    HubStatus { status: u16, url: String },

    #[error("failed to write '{path}': {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

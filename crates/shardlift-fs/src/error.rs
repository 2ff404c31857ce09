use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create staging directory '{path}': {source}")]
    Create { path: PathBuf, source: std::io::Error },

    #[error("failed to remove staging directory '{path}': {source}")]
    Remove { path: PathBuf, source: std::io::Error },

    #[error("staging directory '{path}' already exists")]
    AlreadyExists { path: PathBuf },

    #[error("staging root '{path}' still has {open} open workspace(s)")]
    Busy { path: PathBuf, open: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

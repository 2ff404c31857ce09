use std::path::PathBuf;

use crate::error::PipelineError;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_DRY_RUN_LIMIT: usize = 2;

/// What happens to a source archive once its contents are published.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Retention {
    #[default]
    Keep,
    Delete,
}

/// Settings for one run. Built once and handed to the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Parent of every job workspace; removed when the run ends.
    pub staging_root: PathBuf,
    /// Upper bound on jobs in flight, and so on workspaces on disk.
    pub concurrency: usize,
    pub retention: Retention,
    /// Process only the first `dry_run_limit` jobs.
    pub dry_run: bool,
    pub dry_run_limit: usize,
}

impl PipelineConfig {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            concurrency: DEFAULT_CONCURRENCY,
            retention: Retention::default(),
            dry_run: false,
            dry_run_limit: DEFAULT_DRY_RUN_LIMIT,
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn dry_run(mut self, limit: usize) -> Self {
        self.dry_run = true;
        self.dry_run_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.dry_run && self.dry_run_limit == 0 {
            return Err(PipelineError::InvalidConfig("dry run limit must be at least 1".into()));
        }
        if self.staging_root.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig("staging root is empty".into()));
        }
        Ok(())
    }
}

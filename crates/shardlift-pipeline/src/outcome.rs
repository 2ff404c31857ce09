use std::fmt;
use std::path::PathBuf;

use shardlift_source::ArchiveJob;

use crate::error::{FailedJob, JobFailure};
use crate::extract::ExtractionReport;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// `None` for files published without extraction.
    Succeeded(Option<ExtractionReport>),
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Counts for one run, assembled after every job has finished.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Jobs handed to the run.
    pub discovered: usize,
    /// Jobs left out by a dry run.
    pub skipped: usize,
    pub successful: usize,
    pub failed: usize,
    pub failures: Vec<FailedJob>,
    /// Most workspaces that existed at the same time.
    pub peak_workspaces: usize,
}

impl RunSummary {
    pub(crate) fn new(discovered: usize, skipped: usize) -> Self {
        Self {
            discovered,
            skipped,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, source: PathBuf, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Succeeded(_) => self.successful += 1,
            JobOutcome::Failed(failure) => {
                self.failed += 1;
                self.failures.push((source, failure));
            }
        }
    }

    pub fn processed(&self) -> usize {
        self.successful + self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "discovered {}, successful {}, failed {}",
            self.discovered, self.successful, self.failed
        )?;
        if self.skipped > 0 {
            write!(f, ", skipped {} (dry run)", self.skipped)?;
        }
        Ok(())
    }
}

/// Receives job lifecycle events from worker threads.
pub trait JobObserver: Send + Sync {
    fn run_started(&self, _jobs: usize) {}

    fn job_started(&self, _job: &ArchiveJob) {}

    /// Called after the job's workspace is gone.
    fn job_finished(&self, _job: &ArchiveJob, _outcome: &JobOutcome) {}
}

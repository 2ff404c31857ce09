use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shardlift_fs::StagingRoot;
use shardlift_platform::{CommandRunner, SystemRunner};
use shardlift_source::{ArchiveJob, JobKind};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{PipelineConfig, Retention};
use crate::error::{FailureKind, JobFailure, PipelineError};
use crate::extract::{ExtractionReport, ExtractionStrategy};
use crate::outcome::{JobObserver, JobOutcome, RunSummary};
use crate::publish::Publisher;

/// Runs jobs through extract, publish and cleanup on a bounded pool.
pub struct Orchestrator {
    config: PipelineConfig,
    extractor: Arc<ExtractionStrategy>,
    publisher: Arc<dyn Publisher>,
    observer: Option<Arc<dyn JobObserver>>,
    /// Used to look up external programs during preflight.
    locator: Arc<dyn CommandRunner>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, extractor: ExtractionStrategy, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            config,
            extractor: Arc::new(extractor),
            publisher,
            observer: None,
            locator: Arc::new(SystemRunner),
        }
    }

    /// Resolve programs through `runner` instead of the real PATH.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.locator = runner;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Check external programs before any work is scheduled.
    ///
    /// The publisher's copy tool is required. A missing `tar` only means
    /// every archive takes the in-process path. [`run`](Self::run) calls
    /// this itself.
    pub fn preflight(&self) -> Result<(), PipelineError> {
        self.config.validate()?;
        let runner = self.locator.as_ref();

        if let Some(program) = self.publisher.required_program() {
            let path = shardlift_platform::require(runner, program).map_err(|_| PipelineError::PrerequisiteMissing {
                program: program.to_string(),
            })?;
            tracing::debug!(program, path = %path.display(), "found copy tool");
        }

        if let Some(tar) = self.extractor.tar_program() {
            if runner.locate(tar).is_none() {
                tracing::warn!(program = tar, "system tar not found, archives will be extracted in-process");
            }
        }

        Ok(())
    }

    /// Process `jobs` with at most `concurrency` in flight.
    ///
    /// Job failures are recorded in the summary; only run-level problems
    /// are returned as errors, and those happen before any job starts.
    pub fn run(&self, mut jobs: Vec<ArchiveJob>) -> Result<RunSummary, PipelineError> {
        if jobs.is_empty() {
            return Err(PipelineError::NoMatch);
        }
        self.preflight()?;

        let discovered = jobs.len();
        if self.config.dry_run && jobs.len() > self.config.dry_run_limit {
            jobs.truncate(self.config.dry_run_limit);
            tracing::info!(limit = self.config.dry_run_limit, discovered, "dry run, processing a subset");
        }
        let mut summary = RunSummary::new(discovered, discovered - jobs.len());

        let staging = Arc::new(StagingRoot::create(&self.config.staging_root)?);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(self.config.concurrency)
            .thread_name("shardlift-worker")
            .enable_all()
            .build()
            .map_err(PipelineError::Runtime)?;

        tracing::info!(
            jobs = jobs.len(),
            concurrency = self.config.concurrency,
            staging = %staging.path().display(),
            "run started"
        );
        if let Some(observer) = &self.observer {
            observer.run_started(jobs.len());
        }

        let finished = runtime.block_on(self.schedule(jobs, Arc::clone(&staging)));
        drop(runtime);

        for (source, outcome) in finished {
            summary.record(source, outcome);
        }
        summary.peak_workspaces = staging.peak_open();

        match Arc::try_unwrap(staging) {
            Ok(staging) => {
                if let Err(e) = staging.remove() {
                    tracing::warn!(error = %e, "failed to remove staging root");
                }
            }
            Err(_) => tracing::warn!("staging root still shared after join, leaving it in place"),
        }

        tracing::info!(
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            "run finished"
        );
        Ok(summary)
    }

    async fn schedule(&self, jobs: Vec<ArchiveJob>, staging: Arc<StagingRoot>) -> Vec<(PathBuf, JobOutcome)> {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        // Nothing is uploaded in a dry run, so nothing may be deleted either.
        let retention = if self.config.dry_run {
            Retention::Keep
        } else {
            self.config.retention
        };
        if retention != self.config.retention {
            tracing::info!("dry run, source archives are kept");
        }
        let mut set = JoinSet::new();
        let mut sources = HashMap::new();
        let mut finished = Vec::with_capacity(jobs.len());

        for job in jobs {
            // Taking the permit before spawning keeps queued jobs off the
            // blocking pool.
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let worker = JobWorker {
                extractor: Arc::clone(&self.extractor),
                publisher: Arc::clone(&self.publisher),
                observer: self.observer.clone(),
                staging: Arc::clone(&staging),
                retention,
            };
            let source = job.source_path().to_path_buf();
            let handle = set.spawn_blocking(move || {
                let outcome = worker.process(&job);
                drop(permit);
                outcome
            });
            sources.insert(handle.id(), source);
        }

        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    if let Some(source) = sources.remove(&id) {
                        finished.push((source, outcome));
                    }
                }
                Err(e) => {
                    let source = sources.remove(&e.id()).unwrap_or_default();
                    let message = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    tracing::error!(archive = %source.display(), %message, "job panicked");
                    finished.push((source, JobOutcome::Failed(JobFailure::new(FailureKind::Panicked, message))));
                }
            }
        }

        finished
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "job panicked".to_string(),
        },
    }
}

/// Everything one blocking task needs to carry a job to completion.
struct JobWorker {
    extractor: Arc<ExtractionStrategy>,
    publisher: Arc<dyn Publisher>,
    observer: Option<Arc<dyn JobObserver>>,
    staging: Arc<StagingRoot>,
    retention: Retention,
}

impl JobWorker {
    fn process(&self, job: &ArchiveJob) -> JobOutcome {
        let span = tracing::info_span!("job", archive = %job.relative_path().display());
        let _enter = span.enter();

        tracing::info!(destination = job.destination_uri(), "job started");
        if let Some(observer) = &self.observer {
            observer.job_started(job);
        }

        let outcome = match self.attempt(job) {
            Ok(report) => {
                tracing::info!("job succeeded");
                JobOutcome::Succeeded(report)
            }
            Err(failure) => {
                if failure.kind == FailureKind::PathTraversal {
                    tracing::error!(error = %failure, "archive rejected");
                } else {
                    tracing::warn!(error = %failure, "job failed");
                }
                JobOutcome::Failed(failure)
            }
        };

        if let Some(observer) = &self.observer {
            observer.job_finished(job, &outcome);
        }
        outcome
    }

    fn attempt(&self, job: &ArchiveJob) -> Result<Option<ExtractionReport>, JobFailure> {
        match job.kind() {
            JobKind::Passthrough => {
                self.publisher.publish_file(job.source_path(), job.destination_uri())?;
                tracing::info!("published file as-is");
                Ok(None)
            }
            JobKind::Extract => self.extract_and_publish(job).map(Some),
        }
    }

    fn extract_and_publish(&self, job: &ArchiveJob) -> Result<ExtractionReport, JobFailure> {
        // Dropping the workspace on any early return removes it.
        let workspace = self.staging.acquire()?;
        tracing::debug!(workspace = workspace.id(), "workspace acquired");

        let report = self.extractor.extract(job.source_path(), &workspace)?;
        tracing::info!(
            method = %report.method,
            entries = report.entry_count,
            bytes = report.total_bytes,
            "extracted"
        );

        if is_empty_dir(workspace.path()) {
            tracing::warn!("archive produced no files, nothing to publish");
        } else {
            self.publisher.publish(workspace.path(), job.destination_uri())?;
            tracing::info!(destination = job.destination_uri(), "published");
        }

        let id = workspace.id().to_string();
        workspace.release()?;
        tracing::info!(workspace = %id, "workspace removed");

        if self.retention == Retention::Delete {
            match std::fs::remove_file(job.source_path()) {
                Ok(()) => tracing::info!("source archive deleted"),
                Err(e) => tracing::warn!(error = %e, "failed to delete source archive"),
            }
        }

        Ok(report)
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

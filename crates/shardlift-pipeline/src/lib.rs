//! Extract-then-publish pipeline.
//!
//! # Architecture
//!
//! - `config.rs` - [`PipelineConfig`], immutable once a run starts
//! - `extract.rs` - [`ExtractionStrategy`]: safety scan, system `tar`, in-process fallback
//! - `publish.rs` - [`Publisher`] seam with `gcloud` and dry-run implementations
//! - `orchestrator.rs` - Bounded worker pool driving every job
//! - `outcome.rs` - Per-job outcomes and the [`RunSummary`]
//!
//! A job owns one workspace from acquisition to release. Failures stay
//! inside the job that produced them; the run itself only fails when
//! there is nothing to do or a prerequisite is missing.

mod config;
mod error;
mod extract;
mod orchestrator;
mod outcome;
mod publish;

pub use config::{DEFAULT_CONCURRENCY, DEFAULT_DRY_RUN_LIMIT, PipelineConfig, Retention};
pub use error::{ExtractionError, FailedJob, FailureKind, JobFailure, PipelineError, PublishError};
pub use extract::{Attempt, DEFAULT_TAR_PROGRAM, ExtractionMethod, ExtractionReport, ExtractionStrategy};
pub use orchestrator::Orchestrator;
pub use outcome::{JobObserver, JobOutcome, RunSummary};
pub use publish::{DEFAULT_COPY_PROGRAM, DryRunPublisher, GcloudPublisher, Publisher};

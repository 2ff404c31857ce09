//! Where archives come from.
//!
//! - `job.rs` - [`ArchiveJob`] and remote destination derivation
//! - `locate.rs` - Glob discovery under a local root
//! - `classify.rs` - Suffix classification of hub listings
//! - `hub.rs` - Dataset hub listing and download

mod classify;
mod error;
mod hub;
mod job;
mod locate;

pub use classify::{ARCHIVE_SUFFIXES, Classification, TABULAR_SUFFIXES, classify};
pub use error::{Result, SourceError};
pub use hub::{DatasetHub, HubConfig, HuggingFaceHub};
pub use job::{ArchiveJob, Destination, JobKind};
pub use locate::{DEFAULT_PATTERN, discover, jobs_for};

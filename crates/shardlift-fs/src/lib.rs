//! Staging workspaces for archive extraction.
//!
//! A [`StagingRoot`] is created once per run; every job takes its own
//! [`Workspace`] underneath it. Workspaces are removed when released or
//! dropped, whichever comes first.

mod error;
mod workspace;

pub use error::{Error, Result};
pub use workspace::{StagingRoot, Workspace};

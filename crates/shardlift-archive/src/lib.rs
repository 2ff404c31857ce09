//! Tar extraction that refuses to write outside its destination.
//!
//! # Architecture
//!
//! - `format.rs` - Compression detection and decoders
//! - `sanitize.rs` - Lexical containment checks for member paths and link targets
//! - `extract.rs` - Two-pass extraction: [`scan`] every header, then write
//!
//! A traversal found while scanning fails the archive before the first
//! member is written. [`verify_links`] re-checks a finished tree on disk and
//! is shared with callers that extract with an external tool.

pub use error::{Error, Result};
pub use extract::{
    ArchiveManifest, ArchiveReport, Member, MemberKind, extract, extract_manifest, scan, verify_links,
};
pub use format::{Compression, detect_compression};
pub use sanitize::{SanitizedPath, sanitize_path, sanitize_symlink_target};

mod error;
mod extract;
mod format;
mod sanitize;

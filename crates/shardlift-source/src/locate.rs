use std::path::{Component, Path, PathBuf};

use crate::classify::Classification;
use crate::error::{Result, SourceError};
use crate::job::{ArchiveJob, Destination, JobKind};

pub const DEFAULT_PATTERN: &str = "**/*.tar";

/// Find archives under `root` matching a glob `pattern` relative to it.
///
/// Results are sorted so repeated runs schedule in the same order.
pub fn discover(root: &Path, pattern: &str, destination: &Destination) -> Result<Vec<ArchiveJob>> {
    // glob drops a leading `./` from what it yields, so the root must not carry one either.
    let root = without_cur_dir(root);
    let pattern = pattern.trim_start_matches('/');
    let full = if root.as_os_str().is_empty() {
        pattern.to_string()
    } else {
        format!(
            "{}/{}",
            glob::Pattern::escape(&root.to_string_lossy()).trim_end_matches('/'),
            pattern
        )
    };

    let paths = glob::glob(&full).map_err(|e| SourceError::Pattern {
        pattern: full.clone(),
        source: e,
    })?;

    let mut found = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => found.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!(path = %e.path().display(), error = %e.error(), "skipping unreadable path"),
        }
    }
    found.sort();

    if found.is_empty() {
        return Err(SourceError::NoMatch { pattern: full });
    }

    tracing::info!(count = found.len(), pattern = %full, "discovered archives");
    found
        .iter()
        .map(|path| ArchiveJob::new(&root, path, destination, JobKind::Extract))
        .collect()
}

fn without_cur_dir(root: &Path) -> PathBuf {
    root.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}

/// Turn a classified hub listing, downloaded under `root`, into jobs.
pub fn jobs_for(root: &Path, files: &Classification, destination: &Destination) -> Result<Vec<ArchiveJob>> {
    if files.is_empty() {
        return Err(SourceError::NoMatch {
            pattern: root.display().to_string(),
        });
    }

    let archives = files.archives.iter().map(|f| (f, JobKind::Extract));
    let tabular = files.tabular.iter().map(|f| (f, JobKind::Passthrough));

    archives
        .chain(tabular)
        .map(|(file, kind)| ArchiveJob::new(root, &root.join(file), destination, kind))
        .collect()
}

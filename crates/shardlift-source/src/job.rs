use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, SourceError};

/// Remote prefix such as `gs://bucket/datasets`, stored without a trailing slash.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    uri: String,
    scheme_len: usize,
}

impl Destination {
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || SourceError::InvalidDestination(uri.to_string());

        let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
        let valid_scheme = !scheme.is_empty()
            && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        let bucket = rest.split('/').next().unwrap_or_default();
        if !valid_scheme || bucket.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            uri: uri.trim_end_matches('/').to_string(),
            scheme_len: scheme.len(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.uri[..self.scheme_len]
    }

    pub fn bucket(&self) -> &str {
        let rest = &self.uri[self.scheme_len + 3..];
        rest.split('/').next().unwrap_or(rest)
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Remote folder that mirrors the directory holding `relative_path`.
    ///
    /// `data/shard-000/part.tar` under `gs://b` becomes
    /// `gs://b/data/shard-000/`; a file directly under the root maps to
    /// `gs://b/`. Always ends with `/`.
    pub fn for_relative(&self, relative_path: &Path) -> String {
        let dir: Vec<String> = relative_path
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if dir.is_empty() {
            format!("{}/", self.uri)
        } else {
            format!("{}/{}/", self.uri, dir.join("/"))
        }
    }
}

impl FromStr for Destination {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// How a discovered file is moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// Extract the archive, then publish its contents.
    Extract,
    /// Publish the file itself, untouched.
    Passthrough,
}

/// One file to move. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveJob {
    source_path: PathBuf,
    relative_path: PathBuf,
    destination_uri: String,
    kind: JobKind,
}

impl ArchiveJob {
    pub fn new(root: &Path, source_path: &Path, destination: &Destination, kind: JobKind) -> Result<Self> {
        let relative_path = source_path
            .strip_prefix(root)
            .map_err(|_| SourceError::OutsideRoot {
                path: source_path.to_path_buf(),
                root: root.to_path_buf(),
            })?
            .to_path_buf();

        Ok(Self {
            source_path: source_path.to_path_buf(),
            destination_uri: destination.for_relative(&relative_path),
            relative_path,
            kind,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn destination_uri(&self) -> &str {
        &self.destination_uri
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> Destination {
        Destination::parse("gs://bucket").unwrap()
    }

    #[test]
    fn parse_keeps_scheme_and_bucket() {
        let dest = Destination::parse("gs://vaani-tts/datasets/").unwrap();
        assert_eq!(dest.scheme(), "gs");
        assert_eq!(dest.bucket(), "vaani-tts");
        assert_eq!(dest.as_str(), "gs://vaani-tts/datasets");
    }

    #[test]
    fn parse_rejects_bare_names() {
        assert!(Destination::parse("bucket").is_err());
        assert!(Destination::parse("gs://").is_err());
        assert!(Destination::parse("://bucket").is_err());
    }

    #[test]
    fn nested_archive_maps_to_its_directory() {
        let uri = bucket().for_relative(Path::new("data/shard-000/part.tar"));
        assert_eq!(uri, "gs://bucket/data/shard-000/");
    }

    #[test]
    fn root_archive_maps_to_prefix() {
        assert_eq!(bucket().for_relative(Path::new("part.tar")), "gs://bucket/");
    }

    #[test]
    fn prefix_is_preserved() {
        let dest = Destination::parse("s3://b/migrated").unwrap();
        assert_eq!(dest.for_relative(Path::new("x/y.tar")), "s3://b/migrated/x/");
    }

    #[test]
    fn derivation_is_deterministic() {
        let dest = bucket();
        let path = Path::new("Emilia/ZH-000/000/file.tar");
        assert_eq!(dest.for_relative(path), dest.for_relative(path));
    }

    #[test]
    fn job_relative_to_root() {
        let job = ArchiveJob::new(
            Path::new("/src"),
            Path::new("/src/data/shard-000/part.tar"),
            &bucket(),
            JobKind::Extract,
        )
        .unwrap();
        assert_eq!(job.relative_path(), Path::new("data/shard-000/part.tar"));
        assert_eq!(job.destination_uri(), "gs://bucket/data/shard-000/");
        assert_eq!(job.kind(), JobKind::Extract);
    }

    #[test]
    fn job_outside_root_rejected() {
        let result = ArchiveJob::new(Path::new("/src"), Path::new("/other/a.tar"), &bucket(), JobKind::Extract);
        assert!(matches!(result, Err(SourceError::OutsideRoot { .. })));
    }
}

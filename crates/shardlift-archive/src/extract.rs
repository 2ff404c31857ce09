use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::format::{Compression, Decoder, detect_from_reader};
use crate::sanitize::{SanitizedPath, sanitize_hardlink_target, sanitize_path, sanitize_symlink_target};

/// What kind of filesystem object a member becomes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberKind {
    File,
    Directory,
    /// `raw` is written as-is; `resolved` is where it points lexically.
    Symlink { raw: PathBuf, resolved: PathBuf },
    Hardlink { target: PathBuf },
    /// Devices, fifos and other entries that are never written.
    Skipped,
}

#[derive(Clone, Debug)]
pub struct Member {
    pub path: SanitizedPath,
    pub kind: MemberKind,
    pub size: u64,
}

/// Every member of an archive, already validated against a destination.
#[derive(Clone, Debug)]
pub struct ArchiveManifest {
    pub compression: Compression,
    pub destination: PathBuf,
    pub members: Vec<Member>,
}

impl ArchiveManifest {
    /// Members that end up on disk; the root entry and special files are not counted.
    pub fn entry_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.kind != MemberKind::Skipped && !m.path.relative.as_os_str().is_empty())
            .count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.members
            .iter()
            .filter(|m| m.kind == MemberKind::File)
            .map(|m| m.size)
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveReport {
    pub compression: Compression,
    pub entry_count: usize,
    pub total_bytes: u64,
}

fn open_archive(archive_path: &Path) -> Result<(Compression, tar::Archive<Decoder<BufReader<File>>>)> {
    let mut file = File::open(archive_path).map_err(|e| Error::Open {
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let compression = detect_from_reader(&mut file).map_err(|e| Error::Corrupted {
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let decoder = compression.decoder(BufReader::new(file))?;
    Ok((compression, tar::Archive::new(decoder)))
}

fn canonical_destination(destination: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(destination).map_err(|e| Error::DirectoryCreationFailed {
        path: destination.to_path_buf(),
        source: e,
    })?;
    Ok(destination.canonicalize()?)
}

fn corrupted(archive_path: &Path) -> impl Fn(io::Error) -> Error + '_ {
    move |e| Error::Corrupted {
        path: archive_path.to_path_buf(),
        source: e,
    }
}

/// Read every header of `archive_path` and check where each member would land.
///
/// Nothing is written to `destination` besides creating it. Any member,
/// symlink or hard link resolving outside the destination fails the whole
/// archive.
pub fn scan(archive_path: &Path, destination: &Path) -> Result<ArchiveManifest> {
    let base = canonical_destination(destination)?;
    let (compression, mut archive) = open_archive(archive_path)?;
    let mut members = Vec::new();

    for entry in archive.entries().map_err(corrupted(archive_path))? {
        let entry = entry.map_err(corrupted(archive_path))?;
        let raw_path = entry.path().map_err(corrupted(archive_path))?.into_owned();
        let path = sanitize_path(&raw_path, &base)?;

        let header = entry.header();
        let entry_type = header.entry_type();
        let size = header.size().unwrap_or(0);

        let kind = if entry_type.is_dir() {
            MemberKind::Directory
        } else if entry_type.is_symlink() {
            let raw = link_name(&entry, &raw_path, archive_path)?;
            let resolved = sanitize_symlink_target(&raw, &path, &base)?;
            MemberKind::Symlink { raw, resolved }
        } else if entry_type.is_hard_link() {
            let target = link_name(&entry, &raw_path, archive_path)?;
            MemberKind::Hardlink {
                target: sanitize_hardlink_target(&target, &path, &base)?,
            }
        } else if entry_type.is_file() || entry_type.is_contiguous() || entry_type.is_gnu_sparse() {
            MemberKind::File
        } else {
            MemberKind::Skipped
        };

        if path.relative.as_os_str().is_empty() && kind != MemberKind::Directory {
            return Err(Error::InvalidPath { entry: raw_path });
        }

        members.push(Member { path, kind, size });
    }

    Ok(ArchiveManifest {
        compression,
        destination: base,
        members,
    })
}

fn link_name<R: io::Read>(entry: &tar::Entry<'_, R>, raw_path: &Path, archive_path: &Path) -> Result<PathBuf> {
    entry
        .link_name()
        .map_err(corrupted(archive_path))?
        .map(|p| p.into_owned())
        .ok_or_else(|| Error::InvalidPath {
            entry: raw_path.to_path_buf(),
        })
}

/// Scan the archive, then write it out if every member stays inside `destination`.
pub fn extract(archive_path: &Path, destination: &Path) -> Result<ArchiveReport> {
    let manifest = scan(archive_path, destination)?;
    extract_manifest(archive_path, &manifest)
}

/// Second pass: write the members listed in a manifest produced by [`scan`].
pub fn extract_manifest(archive_path: &Path, manifest: &ArchiveManifest) -> Result<ArchiveReport> {
    let base = &manifest.destination;
    let (_, mut archive) = open_archive(archive_path)?;
    let mut expected = manifest.members.iter();

    for entry in archive.entries().map_err(corrupted(archive_path))? {
        let mut entry = entry.map_err(corrupted(archive_path))?;
        let raw_path = entry.path().map_err(corrupted(archive_path))?.into_owned();

        // The archive must not change between the two passes.
        let member = match expected.next() {
            Some(member) if member.path.original == raw_path => member,
            _ => {
                return Err(Error::Corrupted {
                    path: archive_path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::InvalidData, "archive changed during extraction"),
                });
            }
        };
        if member.path.relative.as_os_str().is_empty() {
            continue;
        }
        let target = &member.path.resolved;

        match &member.kind {
            MemberKind::Directory => create_dirs_inside(target, base, &member.path)?,
            MemberKind::File => {
                prepare_parent(target, base, &member.path)?;
                unlink_existing(target)?;
                let mut out = File::create(target).map_err(|e| Error::ExtractionFailed {
                    path: target.clone(),
                    source: e,
                })?;
                io::copy(&mut entry, &mut out).map_err(|e| Error::ExtractionFailed {
                    path: target.clone(),
                    source: e,
                })?;
                #[cfg(unix)]
                if let Ok(mode) = entry.header().mode() {
                    apply_file_mode(target, mode)?;
                }
            }
            MemberKind::Symlink { raw, .. } => {
                prepare_parent(target, base, &member.path)?;
                unlink_existing(target)?;
                create_symlink(raw, target)?;
            }
            MemberKind::Hardlink { target: link_target } => {
                prepare_parent(target, base, &member.path)?;
                if let Some(parent) = link_target.parent() {
                    ensure_inside(parent, base, &member.path)?;
                }
                unlink_existing(target)?;
                std::fs::hard_link(link_target, target).map_err(|e| Error::LinkCreationFailed {
                    target: link_target.clone(),
                    link: target.clone(),
                    source: e,
                })?;
            }
            MemberKind::Skipped => {
                tracing::debug!(entry = %raw_path.display(), "skipping special archive entry");
            }
        }
    }

    verify_links(base)?;

    Ok(ArchiveReport {
        compression: manifest.compression,
        entry_count: manifest.entry_count(),
        total_bytes: manifest.total_bytes(),
    })
}

/// Create the parent directory of `target` one component at a time.
fn prepare_parent(target: &Path, base: &Path, path: &SanitizedPath) -> Result<()> {
    match target.parent() {
        Some(parent) => create_dirs_inside(parent, base, path),
        None => Ok(()),
    }
}

/// Create `dir` under `base`, following each component on disk so that a
/// symlink written earlier in the same archive cannot redirect the
/// creation outside `base`.
fn create_dirs_inside(dir: &Path, base: &Path, path: &SanitizedPath) -> Result<()> {
    let relative = dir.strip_prefix(base).map_err(|_| Error::PathTraversal {
        entry: path.original.clone(),
        resolved: dir.to_path_buf(),
    })?;

    let mut current = base.to_path_buf();
    for component in relative.components() {
        let next = current.join(component);
        if std::fs::symlink_metadata(&next).is_err() {
            match std::fs::create_dir(&next) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(Error::DirectoryCreationFailed { path: next, source: e });
                }
            }
        }
        ensure_inside(&next, base, path)?;
        current = next.canonicalize()?;
    }
    Ok(())
}

fn ensure_inside(dir: &Path, base: &Path, path: &SanitizedPath) -> Result<()> {
    let real = dir.canonicalize()?;
    if !real.starts_with(base) {
        return Err(Error::PathTraversal {
            entry: path.original.clone(),
            resolved: real,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn apply_file_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = mode & 0o777;
    let mode = if mode & 0o111 != 0 { mode | 0o600 } else { mode | 0o644 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Never write through something an earlier member left at the same path.
fn unlink_existing(target: &Path) -> Result<()> {
    match std::fs::symlink_metadata(target) {
        Ok(meta) if !meta.is_dir() => std::fs::remove_file(target).map_err(|e| Error::ExtractionFailed {
            path: target.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn create_symlink(raw: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(raw, link).map_err(|e| Error::LinkCreationFailed {
        target: raw.to_path_buf(),
        link: link.to_path_buf(),
        source: e,
    })
}

#[cfg(windows)]
fn create_symlink(raw: &Path, link: &Path) -> Result<()> {
    let points_to_dir = link.parent().map(|p| p.join(raw).is_dir()).unwrap_or(false);
    let created = if points_to_dir {
        std::os::windows::fs::symlink_dir(raw, link)
    } else {
        std::os::windows::fs::symlink_file(raw, link)
    };
    created.map_err(|e| Error::LinkCreationFailed {
        target: raw.to_path_buf(),
        link: link.to_path_buf(),
        source: e,
    })
}

/// Walk an extracted tree and check that every symlink resolves inside it.
///
/// The lexical check in [`scan`] cannot see links chained through other
/// links (`a -> .` followed by `b -> a/../x`); this pass follows the links
/// that actually exist on disk. Runs after both extraction paths.
pub fn verify_links(destination: &Path) -> Result<()> {
    let base = destination.canonicalize()?;
    let mut pending = vec![base.clone()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_symlink() {
                let raw = std::fs::read_link(&path)?;
                let resolved = physical_target(&path, &raw)?;
                if !resolved.starts_with(&base) {
                    return Err(Error::LinkEscape {
                        entry: path.strip_prefix(&base).unwrap_or(&path).to_path_buf(),
                        target: resolved,
                    });
                }
            } else if file_type.is_dir() {
                pending.push(path);
            }
        }
    }
    Ok(())
}

/// Follow `raw` from the directory holding `link`, resolving links that exist.
fn physical_target(link: &Path, raw: &Path) -> Result<PathBuf> {
    let mut current = match link.parent() {
        Some(parent) => parent.canonicalize()?,
        None => PathBuf::new(),
    };

    for component in raw.components() {
        match component {
            Component::Normal(part) => {
                let next = current.join(part);
                current = next.canonicalize().unwrap_or(next);
            }
            Component::ParentDir => {
                current.pop();
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => current = PathBuf::from(component.as_os_str()),
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_archive_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(&dir.path().join("missing.tar"), &dir.path().join("out"));
        assert!(matches!(result, Err(Error::Open { .. })));
    }

    #[test]
    fn manifest_counts_written_members_and_file_bytes() {
        let base = PathBuf::from("/ws");
        let member = |name: &str, kind, size| Member {
            path: SanitizedPath {
                original: PathBuf::from(name),
                relative: PathBuf::from(name),
                resolved: base.join(name),
            },
            kind,
            size,
        };
        let manifest = ArchiveManifest {
            compression: Compression::None,
            destination: base.clone(),
            members: vec![
                member("", MemberKind::Directory, 0),
                member("a.txt", MemberKind::File, 10),
                member("dir", MemberKind::Directory, 0),
                member("fifo", MemberKind::Skipped, 0),
                member("b.txt", MemberKind::File, 5),
            ],
        };
        assert_eq!(manifest.total_bytes(), 15);
        assert_eq!(manifest.entry_count(), 3);
    }
}

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Archive entry path checked against a destination directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedPath {
    pub original: PathBuf,
    /// Normalized path relative to the destination. Empty for the destination itself.
    pub relative: PathBuf,
    pub resolved: PathBuf,
}

/// Resolve an entry path under `base` and reject anything that escapes it.
///
/// `base` must already be canonical; the caller canonicalizes the
/// destination once per archive.
pub fn sanitize_path<P: AsRef<Path>, B: AsRef<Path>>(entry_path: P, base: B) -> Result<SanitizedPath> {
    let entry_path = entry_path.as_ref();
    let base = base.as_ref();

    if has_nul(entry_path) {
        return Err(Error::InvalidPath {
            entry: entry_path.to_path_buf(),
        });
    }

    let relative = normalize_relative(entry_path).ok_or_else(|| Error::PathTraversal {
        entry: entry_path.to_path_buf(),
        resolved: lexical_join(base, entry_path),
    })?;

    let resolved = base.join(&relative);
    if !resolved.starts_with(base) {
        return Err(Error::PathTraversal {
            entry: entry_path.to_path_buf(),
            resolved,
        });
    }

    Ok(SanitizedPath {
        original: entry_path.to_path_buf(),
        relative,
        resolved,
    })
}

/// Resolve a symlink target, which is relative to the directory holding the link.
pub fn sanitize_symlink_target<T: AsRef<Path>, B: AsRef<Path>>(
    target: T,
    link: &SanitizedPath,
    base: B,
) -> Result<PathBuf> {
    let target = target.as_ref();
    let base = base.as_ref();

    if target.is_absolute() || has_nul(target) {
        return Err(Error::LinkEscape {
            entry: link.original.clone(),
            target: target.to_path_buf(),
        });
    }

    let joined = link
        .relative
        .parent()
        .map(|parent| parent.join(target))
        .unwrap_or_else(|| target.to_path_buf());

    match normalize_relative(&joined) {
        Some(relative) => Ok(base.join(relative)),
        None => Err(Error::LinkEscape {
            entry: link.original.clone(),
            target: lexical_join(base, &joined),
        }),
    }
}

/// Resolve a hard link target, which names another entry of the same archive.
pub fn sanitize_hardlink_target<T: AsRef<Path>, B: AsRef<Path>>(
    target: T,
    link: &SanitizedPath,
    base: B,
) -> Result<PathBuf> {
    let target = target.as_ref();
    match sanitize_path(target, base) {
        Ok(sanitized) if !sanitized.relative.as_os_str().is_empty() => Ok(sanitized.resolved),
        Ok(sanitized) => Err(Error::LinkEscape {
            entry: link.original.clone(),
            target: sanitized.resolved,
        }),
        Err(Error::PathTraversal { resolved, .. }) => Err(Error::LinkEscape {
            entry: link.original.clone(),
            target: resolved,
        }),
        Err(e) => Err(e),
    }
}

/// Normalize `.` and `..` without touching the filesystem.
///
/// Returns `None` for absolute paths and for any `..` that would climb
/// above the starting point.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(parts.iter().collect())
}

/// Best-effort rendering of where an escaping path would land, for error messages.
fn lexical_join(base: &Path, path: &Path) -> PathBuf {
    let mut result = base.to_path_buf();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir | Component::Prefix(_) => result = PathBuf::from(component.as_os_str()),
            Component::CurDir => {}
        }
    }
    result
}

fn has_nul(path: &Path) -> bool {
    path.as_os_str().as_encoded_bytes().contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> &'static Path {
        if cfg!(windows) {
            Path::new("C:/staging/job")
        } else {
            Path::new("/staging/job")
        }
    }

    #[test]
    fn plain_relative_path() {
        let result = sanitize_path("b/c.txt", base()).unwrap();
        assert_eq!(result.relative, Path::new("b/c.txt"));
        assert_eq!(result.resolved, base().join("b/c.txt"));
    }

    #[test]
    fn dot_components_are_dropped() {
        let result = sanitize_path("./a/./b/../c.txt", base()).unwrap();
        assert_eq!(result.relative, Path::new("a/c.txt"));
    }

    #[test]
    fn parent_escape_rejected() {
        let result = sanitize_path("../../etc/passwd", base());
        assert!(matches!(result, Err(Error::PathTraversal { .. })));
    }

    #[test]
    fn nested_parent_escape_rejected() {
        let result = sanitize_path("a/../../outside.txt", base());
        assert!(matches!(result, Err(Error::PathTraversal { .. })));
    }

    #[test]
    fn absolute_path_rejected() {
        let malicious = if cfg!(windows) { "C:\\etc\\passwd" } else { "/etc/passwd" };
        let result = sanitize_path(malicious, base());
        assert!(matches!(result, Err(Error::PathTraversal { .. })));
    }

    #[test]
    fn root_entry_is_empty_relative() {
        let result = sanitize_path("./", base()).unwrap();
        assert!(result.relative.as_os_str().is_empty());
        assert_eq!(result.resolved, base());
    }

    #[test]
    fn symlink_inside_destination() {
        let link = sanitize_path("bin/tool", base()).unwrap();
        let target = sanitize_symlink_target("../lib/tool", &link, base()).unwrap();
        assert_eq!(target, base().join("lib/tool"));
    }

    #[test]
    fn symlink_escape_rejected() {
        let link = sanitize_path("bin/tool", base()).unwrap();
        let result = sanitize_symlink_target("../../etc/shadow", &link, base());
        assert!(matches!(result, Err(Error::LinkEscape { .. })));
    }

    #[test]
    fn absolute_symlink_rejected() {
        let link = sanitize_path("link", base()).unwrap();
        let result = sanitize_symlink_target("/etc/passwd", &link, base());
        assert!(matches!(result, Err(Error::LinkEscape { .. })));
    }

    #[test]
    fn hardlink_escape_rejected() {
        let link = sanitize_path("copy", base()).unwrap();
        let result = sanitize_hardlink_target("../secret", &link, base());
        assert!(matches!(result, Err(Error::LinkEscape { .. })));
    }

    #[test]
    fn traversal_errors_are_flagged() {
        let err = sanitize_path("../x", base()).unwrap_err();
        assert!(err.is_traversal());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Default)]
struct Occupancy {
    open: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parent directory for all workspaces of one run.
///
/// A directory that already existed is reused but never deleted; only
/// the workspaces this run created underneath it are removed.
#[derive(Debug)]
pub struct StagingRoot {
    path: PathBuf,
    created: bool,
    occupancy: Arc<Occupancy>,
}

impl StagingRoot {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let created = std::fs::symlink_metadata(&path).is_err();
        std::fs::create_dir_all(&path).map_err(|e| Error::Create {
            path: path.clone(),
            source: e,
        })?;

        Ok(Self {
            path,
            created,
            occupancy: Arc::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allocate a fresh workspace named by a random token.
    ///
    /// The directory is created with `create_dir`, so a name collision
    /// fails instead of handing the same directory to two jobs.
    pub fn acquire(&self) -> Result<Workspace> {
        let id = Uuid::new_v4().simple().to_string();
        let path = self.path.join(&id);

        std::fs::create_dir(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists { path: path.clone() },
            _ => Error::Create {
                path: path.clone(),
                source: e,
            },
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            if let Err(e) = std::fs::set_permissions(&path, perms) {
                let _ = std::fs::remove_dir_all(&path);
                return Err(Error::Create { path, source: e });
            }
        }

        self.occupancy.enter();
        tracing::debug!(workspace = %id, path = %path.display(), "workspace acquired");

        Ok(Workspace {
            id,
            path,
            released: false,
            occupancy: Arc::clone(&self.occupancy),
        })
    }

    /// Number of workspaces currently alive under this root.
    pub fn open_count(&self) -> usize {
        self.occupancy.open.load(Ordering::SeqCst)
    }

    /// Highest number of workspaces that were alive at the same time.
    pub fn peak_open(&self) -> usize {
        self.occupancy.peak.load(Ordering::SeqCst)
    }

    /// Whether this run created the root directory.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Remove the root and anything left under it, if this run created it.
    ///
    /// Refuses while workspaces are still alive; callers join their
    /// workers first. A pre-existing root is left in place.
    pub fn remove(self) -> Result<()> {
        let open = self.open_count();
        if open > 0 {
            return Err(Error::Busy {
                path: self.path.clone(),
                open,
            });
        }

        if !self.created {
            tracing::debug!(path = %self.path.display(), "staging root existed before the run, leaving it in place");
            return Ok(());
        }

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Remove {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

/// Directory owned by exactly one in-flight job.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    path: PathBuf,
    released: bool,
    occupancy: Arc<Occupancy>,
}

impl Workspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty the workspace but keep the directory itself.
    pub fn clear(&self) -> Result<()> {
        let entries = std::fs::read_dir(&self.path).map_err(|e| Error::Remove {
            path: self.path.clone(),
            source: e,
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| Error::Remove {
                path: self.path.clone(),
                source: e,
            })?;
            let path = entry.path();
            let removed = match entry.file_type() {
                Ok(ty) if ty.is_dir() => std::fs::remove_dir_all(&path),
                _ => std::fs::remove_file(&path),
            };
            removed.map_err(|e| Error::Remove { path, source: e })?;
        }
        Ok(())
    }

    /// Remove the workspace, reporting failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.occupancy.leave();

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!(workspace = %self.id, "workspace released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Remove {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.occupancy.leave();
        if self.path.exists() {
            match std::fs::remove_dir_all(&self.path) {
                Ok(()) => tracing::info!(workspace = %self.id, "workspace removed"),
                Err(e) => tracing::warn!(workspace = %self.id, error = %e, "failed to remove workspace on drop"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_creates_directory_under_root() -> Result<()> {
        let dir = tempdir().unwrap();
        let root = StagingRoot::create(dir.path().join("staging"))?;
        let ws = root.acquire()?;
        assert!(ws.path().is_dir());
        assert!(ws.path().starts_with(root.path()));
        assert_eq!(root.open_count(), 1);
        Ok(())
    }

    #[test]
    fn workspaces_are_distinct() -> Result<()> {
        let dir = tempdir().unwrap();
        let root = StagingRoot::create(dir.path())?;
        let a = root.acquire()?;
        let b = root.acquire()?;
        assert_ne!(a.id(), b.id());
        assert_ne!(a.path(), b.path());
        Ok(())
    }

    #[test]
    fn release_removes_directory() -> Result<()> {
        let dir = tempdir().unwrap();
        let root = StagingRoot::create(dir.path())?;
        let ws = root.acquire()?;
        let path = ws.path().to_path_buf();
        std::fs::write(path.join("file.txt"), "data").unwrap();
        ws.release()?;
        assert!(!path.exists());
        assert_eq!(root.open_count(), 0);
        Ok(())
    }

    #[test]
    fn drop_removes_directory() -> Result<()> {
        let dir = tempdir().unwrap();
        let root = StagingRoot::create(dir.path())?;
        let path = {
            let ws = root.acquire()?;
            std::fs::create_dir_all(ws.path().join("a/b")).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(root.open_count(), 0);
        Ok(())
    }

    #[test]
    fn clear_keeps_the_directory() -> Result<()> {
        let dir = tempdir().unwrap();
        let root = StagingRoot::create(dir.path())?;
        let ws = root.acquire()?;
        std::fs::create_dir_all(ws.path().join("nested/dir")).unwrap();
        std::fs::write(ws.path().join("top.txt"), "x").unwrap();
        ws.clear()?;
        assert!(ws.path().is_dir());
        assert_eq!(std::fs::read_dir(ws.path()).unwrap().count(), 0);
        Ok(())
    }

    #[test]
    fn peak_tracks_high_water_mark() -> Result<()> {
        let dir = tempdir().unwrap();
        let root = StagingRoot::create(dir.path())?;
        let a = root.acquire()?;
        let b = root.acquire()?;
        drop(a);
        let c = root.acquire()?;
        assert_eq!(root.peak_open(), 2);
        drop((b, c));
        assert_eq!(root.open_count(), 0);
        Ok(())
    }

    #[test]
    fn remove_refuses_while_busy() -> Result<()> {
        let dir = tempdir().unwrap();
        let root = StagingRoot::create(dir.path().join("staging"))?;
        let ws = root.acquire()?;
        let root_path = root.path().to_path_buf();
        assert!(matches!(root.remove(), Err(Error::Busy { open: 1, .. })));
        // the root was consumed by the failed remove; the workspace still cleans itself up
        drop(ws);
        assert!(root_path.exists());
        Ok(())
    }

    #[test]
    fn pre_existing_root_survives_remove() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staging");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("operator-notes.txt"), "keep me").unwrap();

        let root = StagingRoot::create(&path)?;
        assert!(!root.created());
        let ws = root.acquire()?;
        let ws_path = ws.path().to_path_buf();
        ws.release()?;
        root.remove()?;

        assert!(!ws_path.exists());
        assert_eq!(std::fs::read_to_string(path.join("operator-notes.txt")).unwrap(), "keep me");
        Ok(())
    }

    #[test]
    fn remove_deletes_root() -> Result<()> {
        let dir = tempdir().unwrap();
        let root = StagingRoot::create(dir.path().join("staging"))?;
        assert!(root.created());
        let path = root.path().to_path_buf();
        root.acquire()?.release()?;
        root.remove()?;
        assert!(!path.exists());
        Ok(())
    }
}

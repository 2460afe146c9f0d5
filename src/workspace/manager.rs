//! Workspace allocation, tracking, and cleanup.

use super::{WorkspaceError, WorkspaceResult};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Allocates job workspaces under a single base directory.
#[derive(Debug)]
pub struct WorkspaceManager {
    base: Utf8PathBuf,
    root: Dir,
    tracked: Mutex<HashSet<Utf8PathBuf>>,
}

impl WorkspaceManager {
    /// Opens (creating if needed) the base directory.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when the directory cannot be created
    /// or opened, or [`WorkspaceError::NonUtf8Base`] when it resolves to a
    /// non-UTF-8 path.
    pub fn open(base: impl AsRef<Utf8Path>) -> WorkspaceResult<Self> {
        let requested = base.as_ref();
        std::fs::create_dir_all(requested)
            .map_err(|err| WorkspaceError::io(requested, err))?;
        let canonical = std::fs::canonicalize(requested)
            .map_err(|err| WorkspaceError::io(requested, err))?;
        let resolved = Utf8PathBuf::try_from(canonical)
            .map_err(|err| WorkspaceError::NonUtf8Base(err.into_path_buf().display().to_string()))?;
        let root = Dir::open_ambient_dir(&resolved, ambient_authority())
            .map_err(|err| WorkspaceError::io(resolved.clone(), err))?;

        Ok(Self {
            base: resolved,
            root,
            tracked: Mutex::new(HashSet::new()),
        })
    }

    /// Returns the canonical base directory.
    #[must_use]
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    /// Creates and tracks a fresh workspace named `<prefix>-<uuid>`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::InvalidPrefix`] for an empty or unsafe
    /// prefix and [`WorkspaceError::Io`] when the directory cannot be
    /// created.
    pub fn create(&self, prefix: &str) -> WorkspaceResult<Utf8PathBuf> {
        let is_safe = !prefix.is_empty()
            && prefix
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_safe {
            return Err(WorkspaceError::InvalidPrefix(prefix.to_owned()));
        }

        let name = format!("{prefix}-{}", Uuid::new_v4().simple());
        let path = self.base.join(&name);
        self.root
            .create_dir(&name)
            .map_err(|err| WorkspaceError::io(path.clone(), err))?;
        self.tracked_set().insert(path.clone());
        debug!(workspace = %path, "created workspace");
        Ok(path)
    }

    /// Creates a workspace that is cleaned when the returned lease drops.
    ///
    /// # Errors
    ///
    /// Propagates [`WorkspaceManager::create`] failures.
    pub fn lease(self: &Arc<Self>, prefix: &str) -> WorkspaceResult<WorkspaceLease> {
        let path = self.create(prefix)?;
        Ok(WorkspaceLease {
            manager: Arc::clone(self),
            path,
            released: false,
        })
    }

    /// Removes a workspace recursively and stops tracking it.
    ///
    /// Never fails: a path that is already gone counts as cleaned, and a
    /// path that is not a direct child of the base directory is left alone.
    pub fn cleanup(&self, path: &Utf8Path) {
        self.remove_workspace(path);
    }

    /// Removes and untracks `path`, returning whether this call deleted it.
    fn remove_workspace(&self, path: &Utf8Path) -> bool {
        let Some(name) = self.child_name(path) else {
            warn!(path = %path, base = %self.base, "refusing to clean path outside workspace base");
            return false;
        };

        let removed = match self.root.remove_dir_all(name) {
            Ok(()) => {
                debug!(workspace = %path, "removed workspace");
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => {
                warn!(workspace = %path, error = %err, "failed to remove workspace");
                false
            }
        };
        self.tracked_set().remove(path);
        removed
    }

    /// Cleans every tracked workspace.
    pub fn cleanup_all(&self) {
        let drained: Vec<Utf8PathBuf> = self.tracked_set().drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "cleaning tracked workspaces");
        }
        for path in drained {
            self.cleanup(&path);
        }
    }

    /// Removes directories under the base whose modification time is older
    /// than `max_age`, tracked or not. Returns how many were actually
    /// deleted; directories that fail to delete are logged and not counted.
    #[must_use]
    pub fn cleanup_older_than(&self, max_age: Duration) -> usize {
        self.cleanup_older_than_at(max_age, SystemTime::now())
    }

    /// [`WorkspaceManager::cleanup_older_than`] evaluated at `now`.
    #[must_use]
    pub fn cleanup_older_than_at(&self, max_age: Duration, now: SystemTime) -> usize {
        let entries = match self.root.entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(base = %self.base, error = %err, "failed to list workspace base");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
            let Ok(name) = entry.file_name() else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .map(cap_std::time::SystemTime::into_std);
            let Ok(modified_at) = modified else {
                continue;
            };
            let expired = now
                .duration_since(modified_at)
                .is_ok_and(|age| age > max_age);
            if is_dir && expired && self.remove_workspace(&self.base.join(name)) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, max_age_secs = max_age.as_secs(), "swept stale workspaces");
        }
        removed
    }

    /// Returns the currently tracked workspaces.
    #[must_use]
    pub fn tracked(&self) -> Vec<Utf8PathBuf> {
        self.tracked_set().iter().cloned().collect()
    }

    /// Returns whether `path` is currently tracked.
    #[must_use]
    pub fn is_tracked(&self, path: &Utf8Path) -> bool {
        self.tracked_set().contains(path)
    }

    fn tracked_set(&self) -> std::sync::MutexGuard<'_, HashSet<Utf8PathBuf>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the entry name when `path` is exactly one normal component
    /// below the base directory.
    fn child_name<'a>(&self, path: &'a Utf8Path) -> Option<&'a str> {
        let relative = path.strip_prefix(&self.base).ok()?;
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Utf8Component::Normal(name)), None) => Some(name),
            _ => None,
        }
    }
}

/// A workspace that is removed when dropped.
#[derive(Debug)]
pub struct WorkspaceLease {
    manager: Arc<WorkspaceManager>,
    path: Utf8PathBuf,
    released: bool,
}

impl WorkspaceLease {
    /// Returns the workspace path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Cleans the workspace now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.manager.cleanup(&self.path);
        }
    }
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

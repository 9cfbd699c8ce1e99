//! Exclusive holds on daemon configurations.
//!
//! A transaction updating or deleting an entity locks every daemon the change
//! touches. Locking is all-or-nothing: when any daemon is held by another
//! owner nothing is locked. The returned [`ConfigLock`] releases the holds
//! when dropped, so early returns never leak a lock.
//!
//! [`InMemoryLocker`] only guards transactions of one process.
//! [`FileLocker`] holds an advisory lock file per daemon and guards across
//! processes sharing a home directory:
//!
//! ```text
//! ~/.keaflow/locks/
//!   daemon-1.lock
//!   daemon-2.lock
//! ```

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use fs2::FileExt;
use tracing::{debug, warn};

use keaflow_core::{paths, DaemonId};

use crate::error::ConfigError;

/// Owner of a set of locks, one per transaction.
pub type LockOwner = u64;

/// Grants and releases exclusive holds on daemon configurations.
pub trait DaemonLocker: Send + Sync {
    /// Locks all `daemon_ids` for `owner`, or none of them.
    ///
    /// Daemons already held by `owner` are accepted.
    fn lock(&self, owner: LockOwner, daemon_ids: &[DaemonId]) -> Result<(), ConfigError>;

    /// Releases the holds of `owner` on `daemon_ids`. Holds of other owners
    /// are left alone.
    fn unlock(&self, owner: LockOwner, daemon_ids: &[DaemonId]);
}

/// Process-local lock table.
#[derive(Debug, Default)]
pub struct InMemoryLocker {
    held: Mutex<HashMap<DaemonId, LockOwner>>,
}

impl InMemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner currently holding `daemon_id`.
    pub fn holder(&self, daemon_id: DaemonId) -> Option<LockOwner> {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.get(&daemon_id).copied()
    }
}

impl DaemonLocker for InMemoryLocker {
    fn lock(&self, owner: LockOwner, daemon_ids: &[DaemonId]) -> Result<(), ConfigError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(daemon_id) = daemon_ids
            .iter()
            .find(|id| held.get(id).is_some_and(|holder| *holder != owner))
        {
            return Err(ConfigError::Locked {
                daemon_id: *daemon_id,
            });
        }
        for id in daemon_ids {
            held.insert(*id, owner);
        }
        Ok(())
    }

    fn unlock(&self, owner: LockOwner, daemon_ids: &[DaemonId]) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        for id in daemon_ids {
            if held.get(id) == Some(&owner) {
                held.remove(id);
            }
        }
    }
}

/// Lock table shared between processes through advisory lock files.
///
/// The operating system drops the file locks of a process that dies, so a
/// crashed transaction never leaves a daemon locked.
#[derive(Debug)]
pub struct FileLocker {
    dir: PathBuf,
    held: Mutex<HashMap<DaemonId, (LockOwner, File)>>,
}

impl FileLocker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Locker over `<home>/.keaflow/locks/`.
    pub fn open_at(home: &Path) -> Self {
        Self::new(paths::locks_dir(home))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Owner holding `daemon_id` through this locker.
    pub fn holder(&self, daemon_id: DaemonId) -> Option<LockOwner> {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.get(&daemon_id).map(|(owner, _)| *owner)
    }

    fn lock_path(&self, daemon_id: DaemonId) -> PathBuf {
        self.dir.join(format!("daemon-{daemon_id}.lock"))
    }

    /// Opens and locks the file of `daemon_id` without blocking.
    fn try_lock_file(&self, daemon_id: DaemonId) -> Result<File, ConfigError> {
        let path = self.lock_path(daemon_id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| ConfigError::LockFile {
                path: path.clone(),
                source,
            })?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(file),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(ConfigError::Locked { daemon_id })
            }
            Err(source) => Err(ConfigError::LockFile { path, source }),
        }
    }
}

impl DaemonLocker for FileLocker {
    fn lock(&self, owner: LockOwner, daemon_ids: &[DaemonId]) -> Result<(), ConfigError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(daemon_id) = daemon_ids
            .iter()
            .find(|id| held.get(id).is_some_and(|(holder, _)| *holder != owner))
        {
            return Err(ConfigError::Locked {
                daemon_id: *daemon_id,
            });
        }
        if !daemon_ids.is_empty() {
            std::fs::create_dir_all(&self.dir).map_err(|source| ConfigError::LockFile {
                path: self.dir.clone(),
                source,
            })?;
        }

        // Files acquired so far are dropped, and so unlocked, on failure.
        let mut acquired: Vec<(DaemonId, File)> = Vec::with_capacity(daemon_ids.len());
        for id in daemon_ids {
            if held.contains_key(id) || acquired.iter().any(|(acquired_id, _)| acquired_id == id) {
                continue;
            }
            acquired.push((*id, self.try_lock_file(*id)?));
        }
        for (id, file) in acquired {
            held.insert(id, (owner, file));
        }
        Ok(())
    }

    fn unlock(&self, owner: LockOwner, daemon_ids: &[DaemonId]) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        for id in daemon_ids {
            if held.get(id).is_some_and(|(holder, _)| *holder == owner) {
                if let Some((_, file)) = held.remove(id) {
                    if let Err(err) = FileExt::unlock(&file) {
                        warn!(daemon_id = %id, error = %err, "failed to release daemon lock file");
                    }
                }
            }
        }
    }
}

/// Holds on a set of daemons, released on drop.
pub struct ConfigLock {
    locker: Arc<dyn DaemonLocker>,
    owner: LockOwner,
    daemon_ids: Vec<DaemonId>,
}

impl ConfigLock {
    pub fn acquire(
        locker: Arc<dyn DaemonLocker>,
        owner: LockOwner,
        daemon_ids: Vec<DaemonId>,
    ) -> Result<Self, ConfigError> {
        locker.lock(owner, &daemon_ids)?;
        debug!(owner, daemons = ?daemon_ids, "locked daemon configurations");
        Ok(Self {
            locker,
            owner,
            daemon_ids,
        })
    }

    pub fn owner(&self) -> LockOwner {
        self.owner
    }

    pub fn daemon_ids(&self) -> &[DaemonId] {
        &self.daemon_ids
    }
}

impl std::fmt::Debug for ConfigLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLock")
            .field("owner", &self.owner)
            .field("daemon_ids", &self.daemon_ids)
            .finish()
    }
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        self.locker.unlock(self.owner, &self.daemon_ids);
        debug!(owner = self.owner, daemons = ?self.daemon_ids, "released daemon configurations");
    }
}

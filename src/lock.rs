//! System-wide instance lock
//!
//! Only one run may touch a machine's files at a time. [`InstanceLock`] takes
//! an exclusive advisory lock on a named file in the system temp directory and
//! holds it until dropped, so the lock is released on every exit path,
//! including early returns and errors. If the owning process dies the OS
//! releases the lock with the file handle.

use crate::error::{Result, StampError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default lock name
pub const DEFAULT_LOCK_NAME: &str = "stampkeeper";

/// Held cross-process lock; released on drop
#[derive(Debug)]
pub struct InstanceLock {
    name: String,
    path: PathBuf,
    file: File,
}

impl InstanceLock {
    /// Path of the lock file for `name`
    pub fn lock_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}.lock", name))
    }

    /// Acquire the lock named `name`, waiting while another process holds it
    ///
    /// # Errors
    ///
    /// - [`StampError::Lock`] if the lock file cannot be opened or locked
    pub fn acquire(name: &str) -> Result<Self> {
        Self::acquire_at(name, &Self::lock_path(name))
    }

    /// Acquire a lock backed by an explicit file
    pub fn acquire_at(name: &str, path: &Path) -> Result<Self> {
        let lock_err = |source: std::io::Error| StampError::Lock {
            name: name.to_string(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;

        if file.try_lock_exclusive().is_err() {
            info!("Another instance holds '{}', waiting...", name);
            file.lock_exclusive().map_err(lock_err)?;
        }

        debug!("Acquired instance lock {:?}", path);
        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            file,
        })
    }

    /// Try to acquire without waiting; `Ok(None)` if another holder exists
    pub fn try_acquire_at(name: &str, path: &Path) -> Result<Option<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| StampError::Lock {
                name: name.to_string(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                name: name.to_string(),
                path: path.to_path_buf(),
                file,
            })),
            Err(_) => Ok(None),
        }
    }

    /// Lock name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released instance lock {:?}", self.path);
    }
}

//! Exclusive build lock.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::BuildError;

/// Lock file name inside the cache directory.
pub const LOCK_FILE: &str = "kiln.lock";

/// Held while a build or refetch pass writes to the cache.
///
/// The lock is a file created with `create_new`, so only one holder can
/// exist per cache directory. It is removed on drop. A lock left behind by a
/// crashed process must be removed by hand (or with `kiln clean`).
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    /// Acquire the lock in `cache_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Locked`] if another holder exists and
    /// [`BuildError::Io`] if the lock file cannot be created.
    pub fn acquire(cache_dir: &Path) -> Result<Self, BuildError> {
        let path = cache_dir.join(LOCK_FILE);
        let io_err = |source| BuildError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(cache_dir).map_err(io_err)?;
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BuildError::Locked { path: path.clone() });
            }
            Err(e) => return Err(io_err(e)),
        };

        let lock = Self { path }.record_pid(file)?;
        tracing::debug!(path = %lock.path.display(), "acquired build lock");
        Ok(lock)
    }

    /// Write the holder's PID into the lock file.
    ///
    /// On failure the lock is dropped, which removes the file again.
    fn record_pid(self, mut file: impl Write) -> Result<Self, BuildError> {
        match writeln!(file, "{}", std::process::id()) {
            Ok(()) => Ok(self),
            Err(source) => Err(BuildError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a lock file exists in `cache_dir`.
    #[must_use]
    pub fn is_held(cache_dir: &Path) -> bool {
        cache_dir.join(LOCK_FILE).exists()
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release build lock");
        }
    }
}

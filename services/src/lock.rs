//! Advisory per-repo write locks.
//!
//! Every mutating operation on a repo workspace goes through [`RepoLock`].
//! The lock is an OS-level advisory file lock on
//! `<workspace>/locks/writer.lock`, so it also guards against concurrent
//! LLMC processes, not just tasks inside this one. The guard releases the
//! lock on every exit path, including panic, via `Drop`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Poll interval while waiting for a contended lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Convenient result alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors raised while acquiring a repo write lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another writer held the lock for the whole bounded wait.
    #[error("timed out after {waited:?} waiting for write lock {path}")]
    Timeout { path: PathBuf, waited: Duration },

    /// The lock file could not be created or opened.
    #[error("io error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle on a repo's writer lock file.
#[derive(Debug, Clone)]
pub struct RepoLock {
    path: PathBuf,
}

impl RepoLock {
    /// Builds the lock handle for a repo workspace directory, creating the
    /// `locks/` subdirectory if needed.
    pub fn for_workspace(workspace: &Path) -> Result<Self> {
        let dir = workspace.join("locks");
        fs::create_dir_all(&dir).map_err(|e| LockError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self {
            path: dir.join("writer.lock"),
        })
    }

    /// Acquires the exclusive lock, polling for at most `timeout`.
    ///
    /// # Errors
    /// - [`LockError::Timeout`] when another writer holds the lock past the
    ///   bounded wait. Callers are expected to skip the repo this pass.
    pub async fn acquire(&self, timeout: Duration) -> Result<RepoLockGuard> {
        let started = Instant::now();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| LockError::Io {
                path: self.path.clone(),
                source: e,
            })?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(lock = %self.path.display(), "write lock acquired");
                    return Ok(RepoLockGuard {
                        file,
                        path: self.path.clone(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    return Err(LockError::Io {
                        path: self.path.clone(),
                        source: e,
                    });
                }
            }

            if started.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: self.path.clone(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Path of the underlying lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// RAII guard for the held lock. Dropping it releases the OS lock.
#[derive(Debug)]
pub struct RepoLockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            // The OS releases the lock when the fd closes anyway.
            warn!(lock = %self.path.display(), error = %e, "explicit unlock failed");
        } else {
            debug!(lock = %self.path.display(), "write lock released");
        }
    }
}

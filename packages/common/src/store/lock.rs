use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use fs4::FileExt;

use super::error::StoreError;

/// Exclusive advisory lock on a sentinel file.
///
/// Acquisition blocks until the lock is granted; dropping the guard unlocks
/// and removes the sentinel. Removal is best-effort: a sentinel left behind
/// by a crashed process is re-locked, not treated as an error.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    path: PathBuf,
}

impl FileLockGuard {
    /// Open (creating if needed) and exclusively lock the sentinel at `path`.
    ///
    /// This blocks the calling thread; async callers run it on a blocking
    /// worker.
    pub fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Lock {
                path: path.display().to_string(),
                source,
            })?;
        file.lock_exclusive().map_err(|source| StoreError::Lock {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { file, path })
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

//! On-demand thumbnail generation.
//!
//! One thumbnail target is produced by exactly one writer: the check-lock-
//! check sequence takes an exclusive advisory lock on a per-target sentinel,
//! so N concurrent requests for a missing target invoke the external
//! thumbnailer once and all observe the same bytes. Distinct (uuid, width)
//! targets progress in parallel. Thumbnails are never deleted by the core.

use std::fmt;
use std::path::{Path, PathBuf};

use common::{FileLockGuard, ImageStore, StoreError};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Largest accepted thumbnail width.
pub const MAX_WIDTH: u32 = 4096;

/// Height bound passed to the thumbnailer; permissive so aspect ratio is
/// preserved at any practical width.
const PERMISSIVE_HEIGHT: u32 = 16_384;

#[derive(Debug)]
pub enum ThumbError {
    /// Width outside `1..=MAX_WIDTH`.
    InvalidWidth(u32),
    /// The source UUID resolved to nothing.
    SourceMissing(String),
    Store(StoreError),
    /// The thumbnailer failed or produced no file. Carries its merged
    /// output.
    Generation(String),
}

impl fmt::Display for ThumbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWidth(w) => {
                write!(f, "thumbnail width {w} out of range 1..={MAX_WIDTH}")
            }
            Self::SourceMissing(uuid) => write!(f, "no image for uuid {uuid}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Generation(detail) => write!(f, "thumbnailer failed: {detail}"),
        }
    }
}

impl std::error::Error for ThumbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ThumbError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Produce (or find) `thumbnails/{uuid}_w{width}.jpg` for a stored image.
pub async fn thumbnail(
    store: &ImageStore,
    thumbnailer: &Path,
    uuid: &str,
    width: u32,
) -> Result<PathBuf, ThumbError> {
    if width == 0 || width > MAX_WIDTH {
        return Err(ThumbError::InvalidWidth(width));
    }

    let source = store
        .resolve(uuid)
        .await?
        .ok_or_else(|| ThumbError::SourceMissing(uuid.to_string()))?;
    let target = store.thumbnail_path(uuid, width);

    // Fast path: somebody already produced it.
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        debug!(uuid, width, "thumbnail already present");
        return Ok(target);
    }

    // Acquisition blocks, so it runs on a blocking worker.
    let lock_path = store.thumbnail_lock_path(uuid, width);
    let guard = tokio::task::spawn_blocking(move || FileLockGuard::acquire(lock_path))
        .await
        .map_err(|err| ThumbError::Generation(format!("lock task failed: {err}")))??;

    // Re-check: another worker may have produced the file while we waited.
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        debug!(uuid, width, "thumbnail produced while waiting for lock");
        drop(guard);
        return Ok(target);
    }

    info!(uuid, width, "generating thumbnail");
    let output = Command::new(thumbnailer)
        .arg(&source)
        .arg(&target)
        .arg(width.to_string())
        .arg(PERMISSIVE_HEIGHT.to_string())
        .output()
        .await
        .map_err(|err| ThumbError::Generation(format!("failed to spawn thumbnailer: {err}")))?;

    let produced = output.status.success()
        && tokio::fs::try_exists(&target).await.unwrap_or(false);

    // Lock released (and sentinel removed) whether or not we succeeded.
    drop(guard);

    if !produced {
        let mut merged = String::from_utf8_lossy(&output.stdout).into_owned();
        merged.push_str(&String::from_utf8_lossy(&output.stderr));
        warn!(uuid, width, output = %merged, "thumbnailer failed");
        return Err(ThumbError::Generation(merged));
    }

    Ok(target)
}

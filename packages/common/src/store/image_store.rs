use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use super::error::StoreError;

/// Subdirectory holding derived pipeline outputs.
pub const CACHED_DIR: &str = "cached_images";

/// Subdirectory holding generated thumbnails and their lock sentinels.
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Returns true if `raw` is in the canonical hyphenated text form:
/// exactly 36 characters drawn from `[0-9a-f-]`.
pub fn is_canonical_uuid(raw: &str) -> bool {
    raw.len() == 36
        && raw
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b) || b == b'-')
}

/// Flat on-disk image store.
///
/// Layout:
///
/// ```text
/// {root}/
///   {uuid}.{ext}                originals
///   cached_images/{uuid}.png    derived outputs
///   thumbnails/{uuid}_w{N}.jpg  thumbnails (+ transient .lock sentinels)
/// ```
///
/// The base UUID of a filename is the content handle; the store never
/// rewrites a file in place.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Open a store rooted at `root`, creating the directory tree if absent.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join(CACHED_DIR)).await?;
        fs::create_dir_all(root.join(THUMBNAILS_DIR)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target path for an uploaded original. The extension, when present,
    /// is carried over from the original filename.
    pub fn original_path(&self, uuid: Uuid, ext: Option<&str>) -> PathBuf {
        match ext {
            Some(ext) if !ext.is_empty() => self.root.join(format!("{uuid}.{ext}")),
            _ => self.root.join(uuid.to_string()),
        }
    }

    /// Path of the derived output for `uuid`. Derived outputs are always PNG.
    pub fn derived_path(&self, uuid: Uuid) -> PathBuf {
        self.root.join(CACHED_DIR).join(format!("{uuid}.png"))
    }

    /// Allocate a fresh identity for a derived output and return its path.
    pub fn allocate_derived(&self) -> (Uuid, PathBuf) {
        let uuid = Uuid::new_v4();
        (uuid, self.derived_path(uuid))
    }

    /// Target path for the thumbnail of `uuid` at `width`.
    pub fn thumbnail_path(&self, uuid: &str, width: u32) -> PathBuf {
        self.root
            .join(THUMBNAILS_DIR)
            .join(format!("{uuid}_w{width}.jpg"))
    }

    /// Lock sentinel guarding production of a single thumbnail target.
    pub fn thumbnail_lock_path(&self, uuid: &str, width: u32) -> PathBuf {
        self.root
            .join(THUMBNAILS_DIR)
            .join(format!("{uuid}_w{width}.jpg.lock"))
    }

    /// Locate the file identified by `uuid`.
    ///
    /// Searches the store root first, then `cached_images/`, returning the
    /// first entry whose basename is `uuid` or `uuid.{ext}`. The search is
    /// non-recursive. No lock is taken; callers that need stability under
    /// concurrent deletion must re-check existence at point of use.
    pub async fn resolve(&self, uuid: &str) -> Result<Option<PathBuf>, StoreError> {
        if !is_canonical_uuid(uuid) {
            return Err(StoreError::InvalidUuid(uuid.to_string()));
        }

        for dir in [self.root.clone(), self.root.join(CACHED_DIR)] {
            if let Some(path) = find_by_uuid(&dir, uuid).await? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Delete a file, treating "already gone" as success.
    ///
    /// Returns `true` if a file was removed.
    pub async fn remove_file(&self, path: &Path) -> Result<bool, StoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Scan one directory for a basename equal to `uuid` or `uuid.{ext}`.
async fn find_by_uuid(dir: &Path, uuid: &str) -> Result<Option<PathBuf>, StoreError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let dotted = format!("{uuid}.");
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == uuid || name.starts_with(&dotted) {
            if entry.file_type().await?.is_file() {
                return Ok(Some(entry.path()));
            }
        }
    }
    Ok(None)
}

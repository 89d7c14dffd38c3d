// SPDX-License-Identifier: MPL-2.0

//! Storage for captured photos
//!
//! [`PhotoStore`] is the persistence boundary of the interval capture. Saving
//! is two-phase: an entry is reserved, written and only then made visible
//! under its final name. Any failure after the reservation removes it again,
//! so an interrupted save never leaves an empty or half-written photo behind.

use crate::constants::APP_DIR_NAME;
use crate::errors::StorageError;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Name used when the suggested one is unusable
const FALLBACK_NAME: &str = "image.jpg";

/// Upper bound of `-N` suffixes tried for a free file name
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Where a saved image ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRef {
    /// Final file name (may differ from the suggested one)
    pub name: String,
    /// Full path or store-specific location
    pub location: String,
}

/// Image persistence contract
pub trait PhotoStore: Send + Sync {
    /// Save one encoded image
    ///
    /// Blocking. Either the image is fully stored or nothing is left behind.
    fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<StorageRef, StorageError>;
}

/// Run a save on the blocking pool
pub async fn save_async(
    store: Arc<dyn PhotoStore>,
    bytes: Arc<[u8]>,
    suggested_name: String,
) -> Result<StorageRef, StorageError> {
    tokio::task::spawn_blocking(move || store.save(&bytes, &suggested_name))
        .await
        .map_err(|e| StorageError::WriteFailed(format!("save task failed: {}", e)))?
}

/// Default photo directory (`$XDG_PICTURES_DIR/interval-camera`)
pub fn default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

/// Keep only the file name part and drop hidden-file prefixes
fn sanitize_name(suggested: &str) -> String {
    let base = Path::new(suggested)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let trimmed = base.trim_start_matches('.').trim();
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `name.jpg`, `name-1.jpg`, `name-2.jpg`, ...
fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, n, ext),
        _ => format!("{}-{}", name, n),
    }
}

/// A reserved, not yet visible entry; removed when dropped
struct Reservation {
    path: PathBuf,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove reservation");
        }
    }
}

/// Photos as files in one directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    /// The directory is created on the first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn reserve(&self, name: &str) -> Result<(Reservation, File), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            StorageError::ReserveFailed(format!("{}: {}", self.dir.display(), e))
        })?;

        let path = self
            .dir
            .join(format!(".{}.{}.pending", name, uuid::Uuid::new_v4()));
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StorageError::ReserveFailed(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Reserved storage entry");
        Ok((Reservation { path }, file))
    }

    /// Link the reservation under the first free name
    fn finalize(&self, reservation: &Reservation, name: &str) -> Result<PathBuf, StorageError> {
        for n in 0..MAX_NAME_ATTEMPTS {
            let target = self.dir.join(numbered_name(name, n));
            match fs::hard_link(&reservation.path, &target) {
                Ok(()) => return Ok(target),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                // Filesystems without hard links
                Err(_) if !target.exists() => {
                    return fs::rename(&reservation.path, &target)
                        .map(|()| target)
                        .map_err(|e| StorageError::FinalizeFailed(e.to_string()));
                }
                Err(e) => return Err(StorageError::FinalizeFailed(e.to_string())),
            }
        }
        Err(StorageError::FinalizeFailed(format!(
            "no free file name for {}",
            name
        )))
    }
}

impl PhotoStore for DirectoryStore {
    fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<StorageRef, StorageError> {
        let name = sanitize_name(suggested_name);
        let (reservation, mut file) = self.reserve(&name)?;

        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        drop(file);

        let target = self.finalize(&reservation, &name)?;
        let final_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(name);

        debug!(path = %target.display(), size = bytes.len(), "Photo stored");
        Ok(StorageRef {
            name: final_name,
            location: target.display().to_string(),
        })
    }
}

/// An image kept by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    images: Vec<StoredImage>,
    save_calls: u32,
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    /// 1-based save calls that fail
    failing_saves: Vec<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose listed save calls (1-based) fail with `WriteFailed`
    pub fn with_failures(failing_saves: Vec<u32>) -> Self {
        Self {
            failing_saves,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn images(&self) -> Vec<StoredImage> {
        self.lock().images.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PhotoStore for MemoryStore {
    fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<StorageRef, StorageError> {
        let mut inner = self.lock();
        inner.save_calls += 1;
        if self.failing_saves.contains(&inner.save_calls) {
            return Err(StorageError::WriteFailed(format!(
                "simulated failure of save {}",
                inner.save_calls
            )));
        }

        let name = sanitize_name(suggested_name);
        inner.images.push(StoredImage {
            name: name.clone(),
            bytes: bytes.to_vec(),
        });
        Ok(StorageRef {
            location: format!("memory:{}", name),
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name(".hidden.jpg"), "hidden.jpg");
        assert_eq!(sanitize_name(""), FALLBACK_NAME);
        assert_eq!(sanitize_name("/"), FALLBACK_NAME);
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("a.jpg", 0), "a.jpg");
        assert_eq!(numbered_name("a.jpg", 2), "a-2.jpg");
        assert_eq!(numbered_name("noext", 1), "noext-1");
    }

    #[test]
    fn test_memory_store_failures() {
        let store = MemoryStore::with_failures(vec![2]);
        assert!(store.save(b"one", "1.jpg").is_ok());
        assert!(matches!(
            store.save(b"two", "2.jpg"),
            Err(StorageError::WriteFailed(_))
        ));
        let stored = store.save(b"three", "3.jpg").unwrap();
        assert_eq!(stored.location, "memory:3.jpg");
        assert_eq!(store.len(), 2);
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("interval-camera-unit-{}", uuid::Uuid::new_v4()))
    }

    fn pending_entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .filter(|name| name.ends_with(".pending"))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_dropped_reservation_is_removed() {
        let dir = scratch_dir();
        let store = DirectoryStore::new(&dir);

        let (reservation, _file) = store.reserve("shot.jpg").unwrap();
        assert!(reservation.path.exists());
        assert_eq!(pending_entries(&dir).len(), 1);

        drop(reservation);
        assert!(pending_entries(&dir).is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_finalize_rolls_back_reservation() {
        let dir = scratch_dir();
        fs::create_dir_all(&dir).unwrap();
        for n in 0..MAX_NAME_ATTEMPTS {
            fs::write(dir.join(numbered_name("shot.jpg", n)), b"taken").unwrap();
        }

        let store = DirectoryStore::new(&dir);
        assert!(matches!(
            store.save(b"new", "shot.jpg"),
            Err(StorageError::FinalizeFailed(_))
        ));

        // Nothing half-written is left and existing photos are untouched
        assert!(pending_entries(&dir).is_empty());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), MAX_NAME_ATTEMPTS as usize);
        assert_eq!(fs::read(dir.join("shot.jpg")).unwrap(), b"taken");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_save_async_uses_store() {
        let store = Arc::new(MemoryStore::new());
        let result = save_async(store.clone(), Arc::from(&b"jpeg"[..]), "x.jpg".to_string()).await;
        assert_eq!(result.unwrap().name, "x.jpg");
        assert_eq!(store.images()[0].bytes, b"jpeg");
    }
}

//! Disk persistence — `DiskCollaborator` implementation backed by a
//! content-addressed, two-level directory cache.
//!
//! Grounded directly on `teleport-daemon::disk_cache::DiskCache`: the same
//! SHA-256-of-key two-level directory layout, the same atomic
//! tmp-file-then-rename write path, and the same in-memory
//! `RwLock<HashMap<..>>` index with a running `AtomicU64` byte total. The
//! key changes from `ChunkId { inode, index }` to `(ObjectKind, object key
//! bytes, chunk index)`, since this cache indexes HTTP representations
//! rather than filesystem chunks.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;

use cache_core::{DiskCollaborator, ObjectKind};
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use tracing::{debug, error, trace, warn};

/// Composite key identifying one persisted chunk on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DiskKey {
    kind: ObjectKind,
    key: Vec<u8>,
    chunk_index: usize,
}

#[derive(Debug, Clone)]
struct DiskEntry {
    file_path: PathBuf,
    size: u64,
    last_accessed: SystemTime,
}

/// Persistent, content-addressed on-disk cache of object chunks.
pub struct DiskCache {
    cache_dir: PathBuf,
    index: RwLock<HashMap<DiskKey, DiskEntry>>,
    total_bytes: AtomicU64,
}

impl DiskCache {
    /// Creates a disk cache rooted at the platform cache directory
    /// (`~/.cache/polipo-rs/objects` on Linux, matching
    /// `ProjectDirs::from("", "", ...)`'s convention in the donor).
    pub fn new() -> Result<Self, DiskCacheError> {
        let dirs = ProjectDirs::from("", "", "polipo-rs").ok_or(DiskCacheError::NoCacheDir)?;
        Self::with_dir(dirs.cache_dir().join("objects"))
    }

    /// Creates a disk cache rooted at an arbitrary directory (used by tests
    /// and by configuration overrides).
    pub fn with_dir(cache_dir: PathBuf) -> Result<Self, DiskCacheError> {
        fs::create_dir_all(&cache_dir).map_err(|e| DiskCacheError::Io(e.to_string()))?;

        let mut total_bytes = 0u64;
        if let Err(e) = Self::scan_cache_dir(&cache_dir, &mut total_bytes) {
            warn!("error scanning disk cache directory: {}", e);
        }

        debug!(?cache_dir, total_bytes, "disk cache initialized");

        Ok(Self {
            cache_dir,
            index: RwLock::new(HashMap::new()),
            total_bytes: AtomicU64::new(total_bytes),
        })
    }

    /// Walks the two-level directory structure to total up bytes already
    /// on disk. As in the donor, the original key cannot be recovered from
    /// the hash alone, so orphaned files are left for the eviction engine
    /// rather than re-indexed here.
    fn scan_cache_dir(cache_dir: &PathBuf, total_bytes: &mut u64) -> Result<(), DiskCacheError> {
        for entry1 in fs::read_dir(cache_dir).map_err(|e| DiskCacheError::Io(e.to_string()))? {
            let path1 = entry1.map_err(|e| DiskCacheError::Io(e.to_string()))?.path();
            if !path1.is_dir() {
                continue;
            }
            for entry2 in fs::read_dir(&path1).map_err(|e| DiskCacheError::Io(e.to_string()))? {
                let path2 = entry2.map_err(|e| DiskCacheError::Io(e.to_string()))?.path();
                if !path2.is_dir() {
                    continue;
                }
                for entry3 in fs::read_dir(&path2).map_err(|e| DiskCacheError::Io(e.to_string()))? {
                    let file_path = entry3.map_err(|e| DiskCacheError::Io(e.to_string()))?.path();
                    if file_path.is_file()
                        && !file_path.extension().map(|e| e == "tmp").unwrap_or(false)
                    {
                        if let Ok(metadata) = fs::metadata(&file_path) {
                            *total_bytes += metadata.len();
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn chunk_path(&self, key: &DiskKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update([match key.kind {
            ObjectKind::Http => 0u8,
            ObjectKind::Dns => 1u8,
            ObjectKind::Local => 2u8,
        }]);
        hasher.update(&key.key);
        hasher.update(key.chunk_index.to_le_bytes());
        let hash = hex::encode(hasher.finalize());

        debug_assert!(hash.len() >= 4, "unexpectedly short hash: {}", hash.len());
        let dir1 = hash.get(0..2).unwrap_or("00");
        let dir2 = hash.get(2..4).unwrap_or("00");
        let filename = hash.get(4..).unwrap_or(&hash);

        self.cache_dir.join(dir1).join(dir2).join(filename)
    }

    fn write_entry(&self, key: DiskKey, data: &[u8]) -> Result<usize, DiskCacheError> {
        let target_path = self.chunk_path(&key);
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).map_err(|e| DiskCacheError::Io(e.to_string()))?;
        }

        let temp_path = target_path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| DiskCacheError::Io(e.to_string()))?;
            file.write_all(data).map_err(|e| DiskCacheError::Io(e.to_string()))?;
            file.sync_all().map_err(|e| DiskCacheError::Io(e.to_string()))?;
        }
        fs::rename(&temp_path, &target_path).map_err(|e| DiskCacheError::Io(e.to_string()))?;

        let size = data.len() as u64;
        {
            let mut index = self.index.write().map_err(|_| DiskCacheError::LockPoisoned)?;
            if let Some(old) = index.insert(
                key,
                DiskEntry {
                    file_path: target_path.clone(),
                    size,
                    last_accessed: SystemTime::now(),
                },
            ) {
                self.total_bytes.fetch_sub(old.size, Ordering::Relaxed);
            }
        }
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        trace!(bytes = size, ?target_path, "wrote chunk to disk cache");
        Ok(size as usize)
    }

    fn read_entry(&self, key: &DiskKey) -> Option<Vec<u8>> {
        let entry = {
            let index = self.index.read().ok()?;
            index.get(key).cloned()
        }?;

        let mut file = File::open(&entry.file_path).ok()?;
        let mut data = Vec::with_capacity(entry.size as usize);
        file.read_to_end(&mut data).ok()?;

        if let Ok(mut index) = self.index.write() {
            if let Some(e) = index.get_mut(key) {
                e.last_accessed = SystemTime::now();
            }
        }

        Some(data)
    }

    fn remove_entry(&self, key: &DiskKey) {
        let entry = match self.index.write() {
            Ok(mut index) => index.remove(key),
            Err(_) => None,
        };
        if let Some(entry) = entry {
            if let Err(e) = fs::remove_file(&entry.file_path) {
                error!(path = ?entry.file_path, error = %e, "failed to remove disk cache file");
            }
            self.total_bytes.fetch_sub(entry.size, Ordering::Relaxed);
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn entry_count(&self) -> usize {
        self.index.read().map(|i| i.len()).unwrap_or(0)
    }
}

impl DiskCollaborator for DiskCache {
    fn writeout_to_disk(&self, kind: ObjectKind, key: &[u8], chunk_index: usize, bytes: &[u8]) -> usize {
        let disk_key = DiskKey {
            kind,
            key: key.to_vec(),
            chunk_index,
        };
        self.write_entry(disk_key, bytes).unwrap_or_else(|e| {
            error!(error = %e, "writeout_to_disk failed");
            0
        })
    }

    fn revalidate_disk_entry(&self, kind: ObjectKind, key: &[u8]) {
        trace!(?kind, "revalidate_disk_entry (headers re-read deferred to caller)");
    }

    fn dirty_disk_entry(&self, kind: ObjectKind, key: &[u8]) {
        trace!(?kind, "dirty_disk_entry");
        let _ = key;
    }

    fn destroy_disk_entry(&self, kind: ObjectKind, key: &[u8], dallying: bool) {
        // `dallying` is honored by the caller choosing when to invoke this;
        // the disk layer itself always removes immediately once asked,
        // matching the donor's `DiskCache::remove`.
        let _ = dallying;
        let mut chunk_index = 0;
        loop {
            let disk_key = DiskKey {
                kind,
                key: key.to_vec(),
                chunk_index,
            };
            let existed = self.index.read().map(|i| i.contains_key(&disk_key)).unwrap_or(false);
            if !existed {
                break;
            }
            self.remove_entry(&disk_key);
            chunk_index += 1;
        }
    }

    fn object_get_from_disk(&self, kind: ObjectKind, key: &[u8]) -> Option<Vec<u8>> {
        self.read_entry(&DiskKey {
            kind,
            key: key.to_vec(),
            chunk_index: 0,
        })
    }
}

#[derive(Debug, Clone)]
pub enum DiskCacheError {
    NoCacheDir,
    Io(String),
    LockPoisoned,
}

impl std::fmt::Display for DiskCacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskCacheError::NoCacheDir => write!(f, "could not determine cache directory"),
            DiskCacheError::Io(e) => write!(f, "I/O error: {}", e),
            DiskCacheError::LockPoisoned => write!(f, "lock poisoned"),
        }
    }
}

impl std::error::Error for DiskCacheError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn disk_key(chunk_index: usize) -> DiskKey {
        DiskKey {
            kind: ObjectKind::Http,
            key: b"http://a/x".to_vec(),
            chunk_index,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_dir(dir.path().to_path_buf()).unwrap();
        let key = disk_key(0);

        cache.write_entry(key.clone(), b"hello").unwrap();
        assert_eq!(cache.read_entry(&key).unwrap(), b"hello");
    }

    #[test]
    fn total_size_tracks_writes_and_removals() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_dir(dir.path().to_path_buf()).unwrap();

        cache.write_entry(disk_key(0), &[1u8; 100]).unwrap();
        cache.write_entry(disk_key(1), &[2u8; 200]).unwrap();
        assert_eq!(cache.total_size(), 300);

        cache.remove_entry(&disk_key(0));
        assert_eq!(cache.total_size(), 200);
    }

    #[test]
    fn destroy_disk_entry_removes_all_chunks_for_key() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_dir(dir.path().to_path_buf()).unwrap();

        cache.writeout_to_disk(ObjectKind::Http, b"http://a/x", 0, &[1u8; 16]);
        cache.writeout_to_disk(ObjectKind::Http, b"http://a/x", 1, &[2u8; 16]);
        assert_eq!(cache.entry_count(), 2);

        cache.destroy_disk_entry(ObjectKind::Http, b"http://a/x", false);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn chunk_path_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_dir(dir.path().to_path_buf()).unwrap();
        let key = disk_key(0);
        assert_eq!(cache.chunk_path(&key), cache.chunk_path(&key));
    }
}

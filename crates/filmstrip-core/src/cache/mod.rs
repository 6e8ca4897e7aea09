//! Two-tier thumbnail cache.
//!
//! Lookups try the bounded memory tier, then the disk tier; a disk hit is
//! promoted into memory. Keys identify a source path and a requested box
//! under one rendering version. The source's modification stamp travels
//! with the key but is not part of its identity, so a replaced file turns
//! an existing entry into a miss instead of a second entry.
//!
//! Misses are never errors, and disk failures are logged and swallowed.

mod disk;
mod memory;

use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use self::disk::DiskCache;
use self::memory::MemoryCache;
use crate::config::CacheConfig;
use crate::decode::Bitmap;
use crate::error::SetupError;
use crate::identity::{stamp_of, FileIdentity};

/// Lookup key for one rendered size of one source file.
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub version: String,
    /// Source modification stamp at key creation; not part of equality.
    pub stamp: u128,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.width == other.width
            && self.height == other.height
            && self.version == other.version
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.width.hash(state);
        self.height.hash(state);
        self.version.hash(state);
    }
}

/// Counters reported by [`CacheLayer::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_bytes: usize,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub disk_enabled: bool,
}

pub struct CacheLayer {
    memory: Mutex<MemoryCache>,
    disk: Option<DiskCache>,
    version: String,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheLayer {
    /// Build both tiers from configuration, creating the disk root if enabled.
    pub fn new(config: &CacheConfig) -> Result<Self, SetupError> {
        let disk = if config.disk_enabled {
            let root = config.resolved_disk_dir();
            let disk = DiskCache::open(root.clone())
                .map_err(|source| SetupError::CacheDir { path: root, source })?;
            Some(disk)
        } else {
            None
        };

        Ok(Self::with_tiers(
            MemoryCache::new(config.memory_entries, config.memory_bytes),
            disk,
            config.format_version.clone(),
        ))
    }

    /// A cache without a disk tier.
    pub fn memory_only(max_entries: usize, max_bytes: usize, version: impl Into<String>) -> Self {
        Self::with_tiers(MemoryCache::new(max_entries, max_bytes), None, version.into())
    }

    fn with_tiers(memory: MemoryCache, disk: Option<DiskCache>, version: String) -> Self {
        Self {
            memory: Mutex::new(memory),
            disk,
            version,
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Key for `identity` rendered into a `width` x `height` box.
    ///
    /// The stamp is read from disk now, so a file replaced since an earlier
    /// lookup gets a fresh key.
    pub fn key(&self, identity: &FileIdentity, width: u32, height: u32) -> CacheKey {
        CacheKey {
            path: identity.path().to_path_buf(),
            width,
            height,
            version: self.version.clone(),
            stamp: stamp_of(identity.current_modified()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        if let Some(bitmap) = self.lock_memory().get(key) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(bitmap);
        }

        if let Some(bitmap) = self.disk.as_ref().and_then(|disk| disk.get(key)) {
            self.disk_hits.fetch_add(1, Ordering::Relaxed);
            let bitmap = Arc::new(bitmap);
            self.lock_memory().put(key.clone(), bitmap.clone());
            return Some(bitmap);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store into both tiers, returning the shared bitmap.
    pub fn put(&self, key: CacheKey, bitmap: Bitmap) -> Arc<Bitmap> {
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put(&key, &bitmap) {
                warn!(path = %key.path.display(), error = %e, "Disk cache write failed");
            }
        }
        let bitmap = Arc::new(bitmap);
        self.lock_memory().put(key, bitmap.clone());
        bitmap
    }

    /// Drop every size variant of `identity` from both tiers.
    pub fn invalidate(&self, identity: &FileIdentity) {
        self.lock_memory().remove_path(identity.path());
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove_path(identity.path()) {
                warn!(path = %identity, error = %e, "Disk cache invalidation failed");
            }
        }
        debug!(path = %identity, "Invalidated thumbnails");
    }

    /// Drop everything in both tiers.
    pub fn clear(&self) {
        self.clear_memory();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.clear() {
                warn!(root = %disk.root().display(), error = %e, "Disk cache clear failed");
            }
        }
    }

    /// Drop the memory tier only.
    pub fn clear_memory(&self) {
        self.lock_memory().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let memory = self.lock_memory();
        CacheStats {
            memory_entries: memory.len(),
            memory_bytes: memory.bytes(),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            disk_enabled: self.disk.is_some(),
        }
    }

    fn lock_memory(&self) -> MutexGuard<'_, MemoryCache> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn disk_config(dir: &std::path::Path) -> CacheConfig {
        CacheConfig {
            disk_dir: Some(dir.join("thumbs")),
            ..CacheConfig::default()
        }
    }

    fn source(dir: &std::path::Path, name: &str) -> FileIdentity {
        let path = dir.join(name);
        std::fs::write(&path, b"source").unwrap();
        FileIdentity::new(path)
    }

    #[test]
    fn test_key_equality_ignores_stamp() {
        let a = CacheKey {
            path: PathBuf::from("/a.jpg"),
            width: 256,
            height: 256,
            version: "3".into(),
            stamp: 1,
        };
        let b = CacheKey { stamp: 2, ..a.clone() };
        assert_eq!(a, b);
        assert_ne!(a, CacheKey { width: 128, ..a.clone() });
        assert_ne!(a, CacheKey { version: "4".into(), ..a.clone() });
    }

    #[test]
    fn test_disk_hit_after_memory_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheLayer::new(&disk_config(dir.path())).unwrap();
        let identity = source(dir.path(), "a.jpg");
        let bitmap = Bitmap::filled(6, 4, [1, 2, 3]);

        cache.put(cache.key(&identity, 256, 256), bitmap.clone());
        cache.clear_memory();

        let hit = cache.get(&cache.key(&identity, 256, 256)).unwrap();
        assert_eq!(*hit, bitmap);
        let stats = cache.stats();
        assert_eq!(stats.disk_hits, 1);
        assert_eq!(stats.memory_entries, 1);

        // Promoted
        cache.get(&cache.key(&identity, 256, 256)).unwrap();
        assert_eq!(cache.stats().memory_hits, 1);
    }

    #[test]
    fn test_replaced_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheLayer::new(&disk_config(dir.path())).unwrap();
        let identity = source(dir.path(), "a.jpg");
        cache.put(cache.key(&identity, 64, 64), Bitmap::filled(2, 2, [0, 0, 0]));

        let later = SystemTime::now() + Duration::from_secs(120);
        File::options()
            .write(true)
            .open(identity.path())
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(cache.get(&cache.key(&identity, 64, 64)).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_invalidate_removes_all_sizes_from_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheLayer::new(&disk_config(dir.path())).unwrap();
        let a = source(dir.path(), "a.jpg");
        let b = source(dir.path(), "b.jpg");

        cache.put(cache.key(&a, 64, 64), Bitmap::filled(2, 2, [0, 0, 0]));
        cache.put(cache.key(&a, 256, 256), Bitmap::filled(4, 4, [0, 0, 0]));
        cache.put(cache.key(&b, 64, 64), Bitmap::filled(2, 2, [0, 0, 0]));

        cache.invalidate(&a);
        assert!(cache.get(&cache.key(&a, 64, 64)).is_none());
        assert!(cache.get(&cache.key(&a, 256, 256)).is_none());
        assert!(cache.get(&cache.key(&b, 64, 64)).is_some());
    }

    #[test]
    fn test_clear_drops_disk_tier() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheLayer::new(&disk_config(dir.path())).unwrap();
        let a = source(dir.path(), "a.jpg");

        cache.put(cache.key(&a, 64, 64), Bitmap::filled(2, 2, [0, 0, 0]));
        cache.clear();
        assert!(cache.get(&cache.key(&a, 64, 64)).is_none());
        assert_eq!(cache.stats().memory_entries, 0);
    }

    #[test]
    fn test_memory_only_has_no_disk_tier() {
        let cache = CacheLayer::memory_only(4, 1 << 20, "3");
        let a = FileIdentity::new("/nowhere/a.jpg");
        cache.put(cache.key(&a, 64, 64), Bitmap::filled(2, 2, [0, 0, 0]));
        cache.clear_memory();

        assert!(cache.get(&cache.key(&a, 64, 64)).is_none());
        assert!(!cache.stats().disk_enabled);
    }

    #[test]
    fn test_version_change_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let a = source(dir.path(), "a.jpg");
        let v3 = CacheLayer::new(&disk_config(dir.path())).unwrap();
        v3.put(v3.key(&a, 64, 64), Bitmap::filled(2, 2, [0, 0, 0]));

        let v4 = CacheLayer::new(&CacheConfig {
            format_version: "4".into(),
            ..disk_config(dir.path())
        })
        .unwrap();
        assert!(v4.get(&v4.key(&a, 64, 64)).is_none());
    }
}

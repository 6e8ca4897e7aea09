//! Durable tier: one PNG per key under a per-source, per-stamp directory.
//!
//! Layout: `<root>/<blake3(path)>/<stamp>/<blake3(width, height, version)>.png`.
//! A put removes the source's directories for other stamps. Writers of the
//! same stamp never remove each other's files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::ImageFormat;
use tracing::debug;

use super::CacheKey;
use crate::decode::Bitmap;
use crate::encode::encode_png;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub(crate) fn open(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<Bitmap> {
        let file = self.file_for(key);
        let bytes = fs::read(&file).ok()?;
        match image::load_from_memory_with_format(&bytes, ImageFormat::Png) {
            Ok(img) => Some(Bitmap::from_dynamic(img)),
            Err(e) => {
                debug!(path = %file.display(), error = %e, "Dropping unreadable cache blob");
                let _ = fs::remove_file(&file);
                None
            }
        }
    }

    /// Write `bitmap` atomically: encode to a temporary file, then rename.
    pub(crate) fn put(&self, key: &CacheKey, bitmap: &Bitmap) -> io::Result<()> {
        let source_dir = self.dir_for(&key.path);
        let stamp = stamp_name(key.stamp);
        self.purge_other_stamps(&source_dir, &stamp)?;

        let bytes = encode_png(bitmap).map_err(io::Error::other)?;
        let file = self.file_for(key);
        match write_atomic(&file, &bytes) {
            // A concurrent purge or clear removed the directory mid-write
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %file.display(), "Cache directory vanished; retrying write");
                write_atomic(&file, &bytes)
            }
            other => other,
        }
    }

    pub(crate) fn remove_path(&self, path: &Path) -> io::Result<()> {
        ignore_missing(fs::remove_dir_all(self.dir_for(path)))
    }

    pub(crate) fn clear(&self) -> io::Result<()> {
        ignore_missing(fs::remove_dir_all(&self.root))?;
        fs::create_dir_all(&self.root)
    }

    fn purge_other_stamps(&self, source_dir: &Path, keep: &str) -> io::Result<()> {
        let entries = match fs::read_dir(source_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_name() == keep {
                continue;
            }
            debug!(path = %entry.path().display(), "Removing stale cache stamp");
            ignore_missing(fs::remove_dir_all(entry.path()))?;
        }
        Ok(())
    }

    fn dir_for(&self, path: &Path) -> PathBuf {
        let hash = blake3::hash(path.as_os_str().as_encoded_bytes());
        self.root.join(hash.to_hex().as_str())
    }

    fn file_for(&self, key: &CacheKey) -> PathBuf {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&key.width.to_le_bytes());
        hasher.update(&key.height.to_le_bytes());
        hasher.update(key.version.as_bytes());
        self.dir_for(&key.path)
            .join(stamp_name(key.stamp))
            .join(format!("{}.png", hasher.finalize().to_hex()))
    }
}

fn stamp_name(stamp: u128) -> String {
    format!("{stamp:032x}")
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn write_atomic(file: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = file.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = file.with_extension(format!(
        "tmp{}-{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, file) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(stamp: u128, edge: u32) -> CacheKey {
        CacheKey {
            path: PathBuf::from("/photos/a.jpg"),
            width: edge,
            height: edge,
            version: "3".to_string(),
            stamp,
        }
    }

    fn gradient(width: u32, height: u32) -> Bitmap {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[(x * 7) as u8, (y * 11) as u8, 200]);
            }
        }
        Bitmap::new(width, height, pixels)
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path().join("thumbs")).unwrap();
        let bitmap = gradient(17, 9);

        cache.put(&key(1, 32), &bitmap).unwrap();
        assert_eq!(cache.get(&key(1, 32)), Some(bitmap));
        assert_eq!(cache.get(&key(1, 64)), None);
    }

    #[test]
    fn test_new_stamp_misses_and_purges_old_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();

        cache.put(&key(1, 32), &gradient(4, 4)).unwrap();
        cache.put(&key(1, 64), &gradient(8, 8)).unwrap();
        assert_eq!(cache.get(&key(2, 32)), None);

        cache.put(&key(2, 32), &gradient(4, 4)).unwrap();
        assert_eq!(cache.get(&key(1, 64)), None);
        assert!(cache.get(&key(2, 32)).is_some());
    }

    #[test]
    fn test_stamp_change_leaves_current_stamp_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();
        cache.put(&key(1, 32), &gradient(4, 4)).unwrap();

        // An in-flight write for the new stamp, not yet renamed
        let pending = cache.file_for(&key(2, 64)).with_extension("tmp1-1");
        fs::create_dir_all(pending.parent().unwrap()).unwrap();
        fs::write(&pending, b"partial").unwrap();

        cache.put(&key(2, 32), &gradient(4, 4)).unwrap();
        assert!(pending.exists());
        assert!(!cache.file_for(&key(1, 32)).parent().unwrap().exists());
        assert!(cache.get(&key(2, 32)).is_some());
    }

    #[test]
    fn test_concurrent_puts_after_stamp_change_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();
        for edge in [16, 24] {
            cache.put(&key(1, edge), &gradient(4, 4)).unwrap();
        }

        let edges: Vec<u32> = (1..=16).map(|i| i * 8).collect();
        std::thread::scope(|scope| {
            for &edge in &edges {
                let cache = &cache;
                scope.spawn(move || cache.put(&key(2, edge), &gradient(4, 4)).unwrap());
            }
        });

        for edge in edges {
            assert!(cache.get(&key(2, edge)).is_some(), "edge {edge}");
        }
        assert_eq!(cache.get(&key(1, 16)), None);
    }

    #[test]
    fn test_put_after_directory_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path().join("c")).unwrap();
        cache.put(&key(1, 32), &gradient(4, 4)).unwrap();

        fs::remove_dir_all(cache.root()).unwrap();
        cache.put(&key(1, 32), &gradient(4, 4)).unwrap();
        assert!(cache.get(&key(1, 32)).is_some());
    }

    #[test]
    fn test_remove_path_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path().join("c")).unwrap();

        cache.put(&key(1, 32), &gradient(4, 4)).unwrap();
        cache.remove_path(Path::new("/photos/a.jpg")).unwrap();
        assert_eq!(cache.get(&key(1, 32)), None);
        // Removing again is fine
        cache.remove_path(Path::new("/photos/a.jpg")).unwrap();

        cache.put(&key(1, 32), &gradient(4, 4)).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.get(&key(1, 32)), None);
        assert!(cache.root().is_dir());
    }

    #[test]
    fn test_corrupt_blob_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();
        cache.put(&key(1, 32), &gradient(4, 4)).unwrap();

        let file = cache.file_for(&key(1, 32));
        fs::write(&file, b"not a png").unwrap();
        assert_eq!(cache.get(&key(1, 32)), None);
        assert!(!file.exists());
    }
}

//! Bounded in-memory tier.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use super::CacheKey;
use crate::decode::Bitmap;

struct Entry {
    bitmap: Arc<Bitmap>,
    stamp: u128,
    tick: u64,
}

/// Least-recently-used map bounded by entry count and pixel bytes.
///
/// Recency is a monotonically increasing tick; `order` maps ticks back to
/// keys so the oldest entry is always the first one.
pub(crate) struct MemoryCache {
    entries: HashMap<CacheKey, Entry>,
    order: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl MemoryCache {
    pub(crate) fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_tick: 0,
            bytes: 0,
            max_entries,
            max_bytes,
        }
    }

    /// Entry for `key` if present and recorded under the same modification stamp.
    pub(crate) fn get(&mut self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        let stamp = self.entries.get(key)?.stamp;
        if stamp != key.stamp {
            self.remove(key);
            return None;
        }

        let tick = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.clone());
        Some(entry.bitmap.clone())
    }

    pub(crate) fn put(&mut self, key: CacheKey, bitmap: Arc<Bitmap>) {
        self.remove(&key);

        let size = bitmap.byte_size();
        if self.max_entries == 0 || size > self.max_bytes {
            return;
        }

        let tick = self.bump();
        self.bytes += size;
        self.order.insert(tick, key.clone());
        self.entries.insert(
            key.clone(),
            Entry {
                bitmap,
                stamp: key.stamp,
                tick,
            },
        );
        self.evict();
    }

    /// Drop every size variant of `path`.
    pub(crate) fn remove_path(&mut self, path: &Path) {
        let keys: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|k| k.path == path)
            .cloned()
            .collect();
        for key in keys {
            self.remove(&key);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.bytes = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.tick);
            self.bytes -= entry.bitmap.byte_size();
        }
    }

    fn evict(&mut self) {
        while self.entries.len() > self.max_entries || self.bytes > self.max_bytes {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.bytes -= entry.bitmap.byte_size();
            }
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }
}

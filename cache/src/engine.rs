//! The storage engine: tiered cache over the disk tier.
//!
//! `BlinkDb` enforces membership exclusivity across tiers: every
//! transition that writes a key into one tier removes it from the tier it
//! might otherwise inhabit. SET drops any prior disk copy before the cache
//! write; warm eviction moves the in-memory copy to disk; a GET that loads
//! from disk removes the disk copy and re-inserts into hot.

use crate::disk::DiskStore;
use crate::tiered::{SpillSink, TieredCache};
use std::io;
use std::path::PathBuf;
use tracing::warn;

/// Engine counters, reported at shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub disk_loads: u64,
    pub disk_spills: u64,
}

/// Writes warm-tier evictees through to the disk store.
///
/// A failed spill is logged and the value is lost; the eviction itself has
/// already happened and the client's SET still succeeded.
struct DiskSink<'a> {
    disk: &'a mut DiskStore,
    spills: &'a mut u64,
}

impl SpillSink for DiskSink<'_> {
    fn spill(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.disk.put(&key, &value) {
            Ok(()) => *self.spills += 1,
            Err(e) => warn!(error = %e, "eviction spill failed; value lost"),
        }
    }
}

/// The BlinkDB storage engine.
pub struct BlinkDb {
    cache: TieredCache,
    disk: DiskStore,
    stats: Stats,
}

/// Builder for [`BlinkDb`].
pub struct Builder {
    hot_capacity: usize,
    warm_capacity: usize,
    data_dir: PathBuf,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            hot_capacity: 10_000,
            warm_capacity: 50_000,
            data_dir: PathBuf::from("./blinkdb_data"),
        }
    }
}

impl Builder {
    pub fn hot_capacity(mut self, entries: usize) -> Self {
        self.hot_capacity = entries;
        self
    }

    pub fn warm_capacity(mut self, entries: usize) -> Self {
        self.warm_capacity = entries;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Open the disk tier (creating the data dir) and build the engine.
    pub fn build(self) -> io::Result<BlinkDb> {
        let disk = DiskStore::open(self.data_dir)?;
        Ok(BlinkDb {
            cache: TieredCache::new(self.hot_capacity, self.warm_capacity),
            disk,
            stats: Stats::default(),
        })
    }
}

impl BlinkDb {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Store a key. The value lands in hot; any prior disk copy is removed
    /// first so the key never resides in two tiers.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        if self.disk.contains(key) {
            self.disk.remove(key);
        }
        let mut sink = DiskSink {
            disk: &mut self.disk,
            spills: &mut self.stats.disk_spills,
        };
        self.cache.set(key, value.to_vec(), &mut sink);
    }

    /// Look up a key: cache first, then the disk tier. A disk hit promotes
    /// the value back into hot and removes the disk copy.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let mut sink = DiskSink {
            disk: &mut self.disk,
            spills: &mut self.stats.disk_spills,
        };
        if let Some(value) = self.cache.get(key, &mut sink) {
            self.stats.hits += 1;
            return Some(value.to_vec());
        }

        self.stats.misses += 1;
        if !self.disk.contains(key) {
            return None;
        }
        let Some(value) = self.disk.get(key) else {
            // Read failure surfaces to the client as a plain miss.
            return None;
        };

        self.disk.remove(key);
        self.stats.disk_loads += 1;
        let mut sink = DiskSink {
            disk: &mut self.disk,
            spills: &mut self.stats.disk_spills,
        };
        self.cache.set(key, value.clone(), &mut sink);
        Some(value)
    }

    /// Delete a key from every tier. Returns whether anything was removed.
    pub fn del(&mut self, key: &[u8]) -> bool {
        let mut removed = self.cache.remove(key);
        if self.disk.contains(key) {
            self.disk.remove(key);
            removed = true;
        }
        removed
    }

    /// Rewrite the disk index. Called on clean shutdown; entries spilled
    /// since the last persist are unreachable after a crash (the index is
    /// the source of truth).
    pub fn persist(&self) -> io::Result<()> {
        self.disk.persist_index()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn hot_len(&self) -> usize {
        self.cache.hot_len()
    }

    pub fn warm_len(&self) -> usize {
        self.cache.warm_len()
    }

    pub fn disk_len(&self) -> usize {
        self.disk.len()
    }

    pub fn hot_contains(&self, key: &[u8]) -> bool {
        self.cache.hot_contains(key)
    }

    pub fn warm_contains(&self, key: &[u8]) -> bool {
        self.cache.warm_contains(key)
    }

    pub fn disk_contains(&self, key: &[u8]) -> bool {
        self.disk.contains(key)
    }
}

//! The tiered cache policy.
//!
//! Two [`LruLevel`]s (hot and warm) plus per-key access counters. Writes
//! land in hot; hot evictees demote to the warm front; warm evictees leave
//! the cache through a [`SpillSink`]. A warm key read often enough is
//! promoted back into hot.
//!
//! Counters are scoped to a key's residency at its current level: every
//! level transition (promotion, demotion, insert) resets the counter to 1.

use crate::lru::LruLevel;
use ahash::AHashMap;

/// Cumulative accesses at warm before a key is promoted to hot.
pub const PROMOTION_THRESHOLD: u32 = 3;

/// Receives entries evicted past the warm tier.
///
/// The engine backs this with the disk store; tests use a plain `Vec`.
/// Delivery is synchronous: by the time `set`/`get` returns, any evictee
/// has already been handed to the sink.
pub trait SpillSink {
    fn spill(&mut self, key: Vec<u8>, value: Vec<u8>);
}

impl SpillSink for Vec<(Vec<u8>, Vec<u8>)> {
    fn spill(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.push((key, value));
    }
}

/// Hot/warm tiered LRU cache.
///
/// Invariants: the hot and warm key sets are disjoint; neither level
/// exceeds its capacity; a single `set` or `get` hands at most one entry
/// to the spill sink.
pub struct TieredCache {
    hot: LruLevel,
    warm: LruLevel,
    access: AHashMap<Vec<u8>, u32>,
}

impl TieredCache {
    pub fn new(hot_capacity: usize, warm_capacity: usize) -> Self {
        Self {
            hot: LruLevel::new(hot_capacity),
            warm: LruLevel::new(warm_capacity),
            access: AHashMap::new(),
        }
    }

    /// Look up a key, updating recency and the access counter.
    ///
    /// A warm hit that reaches [`PROMOTION_THRESHOLD`] promotes the key
    /// into hot, demoting the hot LRU victim to warm. The warm slot freed
    /// by the promotion absorbs the demoted victim, so promotion itself
    /// never spills.
    pub fn get(&mut self, key: &[u8], sink: &mut dyn SpillSink) -> Option<&[u8]> {
        if self.hot.contains(key) {
            self.hot.touch(key);
            self.bump(key);
            return self.hot.get(key);
        }

        if !self.warm.contains(key) {
            return None;
        }

        self.warm.touch(key);
        let count = self.bump(key);
        if count >= PROMOTION_THRESHOLD
            && self.hot.capacity() > 0
            && let Some(value) = self.warm.remove(key)
        {
            if self.hot.len() >= self.hot.capacity() {
                self.evict_hot(sink);
            }
            self.hot.insert(key.to_vec(), value);
            self.access.insert(key.to_vec(), 1);
            return self.hot.get(key);
        }
        self.warm.get(key)
    }

    /// Insert or replace a key. New and updated entries always land in hot.
    pub fn set(&mut self, key: &[u8], value: Vec<u8>, sink: &mut dyn SpillSink) {
        if self.warm.contains(key) {
            self.warm.remove(key);
            self.access.remove(key);
        }

        if let Some(existing) = self.hot.get_mut(key) {
            *existing = value;
            self.hot.touch(key);
            self.access.insert(key.to_vec(), 1);
            return;
        }

        if self.hot.capacity() == 0 {
            // Degenerate configuration: the cache holds nothing and every
            // read misses. Stale copies were cleared above.
            self.access.remove(key);
            return;
        }

        if self.hot.len() >= self.hot.capacity() {
            self.evict_hot(sink);
        }
        self.hot.insert(key.to_vec(), value);
        self.access.insert(key.to_vec(), 1);
    }

    /// Remove a key from whichever level holds it. Returns whether an
    /// entry was removed.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        let removed = self.hot.remove(key).is_some() || self.warm.remove(key).is_some();
        self.access.remove(key);
        removed
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.hot.contains(key) || self.warm.contains(key)
    }

    pub fn hot_contains(&self, key: &[u8]) -> bool {
        self.hot.contains(key)
    }

    pub fn warm_contains(&self, key: &[u8]) -> bool {
        self.warm.contains(key)
    }

    pub fn hot_len(&self) -> usize {
        self.hot.len()
    }

    pub fn warm_len(&self) -> usize {
        self.warm.len()
    }

    pub fn hot_capacity(&self) -> usize {
        self.hot.capacity()
    }

    pub fn warm_capacity(&self) -> usize {
        self.warm.capacity()
    }

    fn bump(&mut self, key: &[u8]) -> u32 {
        if let Some(count) = self.access.get_mut(key) {
            *count += 1;
            *count
        } else {
            self.access.insert(key.to_vec(), 1);
            1
        }
    }

    /// Demote the hot LRU victim to the warm front, cascading the warm LRU
    /// victim to the sink when warm is full. Strictly one sink delivery.
    fn evict_hot(&mut self, sink: &mut dyn SpillSink) {
        let Some((key, value)) = self.hot.evict_lru() else {
            return;
        };

        if self.warm.capacity() == 0 {
            self.access.remove(&key);
            sink.spill(key, value);
            return;
        }

        if self.warm.len() >= self.warm.capacity()
            && let Some((warm_key, warm_value)) = self.warm.evict_lru()
        {
            self.access.remove(&warm_key);
            sink.spill(warm_key, warm_value);
        }

        self.access.insert(key.clone(), 1);
        self.warm.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Spilled = Vec<(Vec<u8>, Vec<u8>)>;

    fn set(cache: &mut TieredCache, sink: &mut Spilled, key: &str, value: &str) {
        cache.set(key.as_bytes(), value.as_bytes().to_vec(), sink);
    }

    fn get<'a>(cache: &'a mut TieredCache, sink: &mut Spilled, key: &str) -> Option<&'a [u8]> {
        cache.get(key.as_bytes(), sink)
    }

    fn assert_tiers(cache: &TieredCache, hot: &[&str], warm: &[&str]) {
        assert_eq!(cache.hot_len(), hot.len(), "hot size");
        assert_eq!(cache.warm_len(), warm.len(), "warm size");
        for key in hot {
            assert!(cache.hot_contains(key.as_bytes()), "hot missing {key}");
            assert!(!cache.warm_contains(key.as_bytes()), "{key} in both tiers");
        }
        for key in warm {
            assert!(cache.warm_contains(key.as_bytes()), "warm missing {key}");
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut cache = TieredCache::new(2, 2);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "k", "v");
        assert_eq!(get(&mut cache, &mut sink, "k"), Some(b"v" as &[u8]));
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut cache = TieredCache::new(2, 2);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "k", "v1");
        set(&mut cache, &mut sink, "k", "v2");
        assert_eq!(get(&mut cache, &mut sink, "k"), Some(b"v2" as &[u8]));
        assert_eq!(cache.hot_len(), 1);
    }

    #[test]
    fn test_eviction_chain() {
        // Hhot=2, Hwarm=2 walkthrough: three sets fill hot and push the
        // oldest to warm, two more cascade the warm LRU out to the sink.
        let mut cache = TieredCache::new(2, 2);
        let mut sink = Spilled::new();

        set(&mut cache, &mut sink, "a", "1");
        set(&mut cache, &mut sink, "b", "2");
        set(&mut cache, &mut sink, "c", "3");
        assert_tiers(&cache, &["c", "b"], &["a"]);
        assert!(sink.is_empty());

        set(&mut cache, &mut sink, "d", "4");
        assert_tiers(&cache, &["d", "c"], &["b", "a"]);
        assert!(sink.is_empty());

        set(&mut cache, &mut sink, "e", "5");
        assert_tiers(&cache, &["e", "d"], &["c", "b"]);
        assert_eq!(sink, vec![(b"a".to_vec(), b"1".to_vec())]);
    }

    #[test]
    fn test_one_spill_per_set() {
        let mut cache = TieredCache::new(1, 1);
        let mut sink = Spilled::new();
        for i in 0..10 {
            let before = sink.len();
            set(&mut cache, &mut sink, &format!("k{i}"), "v");
            assert!(sink.len() - before <= 1);
        }
        // k0..k7 spilled, k8 warm, k9 hot.
        assert_eq!(sink.len(), 8);
    }

    #[test]
    fn test_promotion_after_repeated_warm_hits() {
        // Hot={x,y}, Warm={z}: repeated reads of z promote it into hot and
        // demote the hot LRU victim to warm.
        let mut cache = TieredCache::new(2, 2);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "z", "zv");
        set(&mut cache, &mut sink, "x", "xv");
        set(&mut cache, &mut sink, "y", "yv");
        assert_tiers(&cache, &["y", "x"], &["z"]);

        get(&mut cache, &mut sink, "z");
        get(&mut cache, &mut sink, "z");
        get(&mut cache, &mut sink, "z");

        assert!(cache.hot_contains(b"z"), "z promoted to hot");
        assert!(cache.warm_contains(b"x"), "hot LRU victim demoted");
        assert_tiers(&cache, &["z", "y"], &["x"]);
        assert!(sink.is_empty(), "promotion must not spill");
    }

    #[test]
    fn test_promotion_with_full_warm_does_not_spill() {
        // The slot freed by removing the promoted key absorbs the demoted
        // hot victim even when warm is at capacity.
        let mut cache = TieredCache::new(2, 2);
        let mut sink = Spilled::new();
        for key in ["w", "z", "x", "y"] {
            set(&mut cache, &mut sink, key, "v");
        }
        assert_tiers(&cache, &["y", "x"], &["z", "w"]);

        get(&mut cache, &mut sink, "z");
        get(&mut cache, &mut sink, "z");
        get(&mut cache, &mut sink, "z");

        assert!(cache.hot_contains(b"z"));
        assert_tiers(&cache, &["z", "y"], &["x", "w"]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_counter_resets_on_promotion() {
        let mut cache = TieredCache::new(2, 2);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "z", "zv");
        set(&mut cache, &mut sink, "x", "xv");
        set(&mut cache, &mut sink, "y", "yv");

        get(&mut cache, &mut sink, "z");
        get(&mut cache, &mut sink, "z");
        assert!(cache.hot_contains(b"z"));
        assert_eq!(cache.access[b"z".as_slice()], 1);
    }

    #[test]
    fn test_counter_resets_on_demotion() {
        let mut cache = TieredCache::new(1, 2);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "a", "av");
        get(&mut cache, &mut sink, "a");
        get(&mut cache, &mut sink, "a");
        // Demote a by inserting b.
        set(&mut cache, &mut sink, "b", "bv");
        assert!(cache.warm_contains(b"a"));
        assert_eq!(cache.access[b"a".as_slice()], 1);
    }

    #[test]
    fn test_set_on_warm_resident_moves_to_hot() {
        let mut cache = TieredCache::new(2, 2);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "a", "1");
        set(&mut cache, &mut sink, "b", "2");
        set(&mut cache, &mut sink, "c", "3");
        assert!(cache.warm_contains(b"a"));

        set(&mut cache, &mut sink, "a", "new");
        assert!(cache.hot_contains(b"a"));
        assert!(!cache.warm_contains(b"a"));
        assert_eq!(get(&mut cache, &mut sink, "a"), Some(b"new" as &[u8]));
    }

    #[test]
    fn test_remove_from_either_level() {
        let mut cache = TieredCache::new(2, 2);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "a", "1");
        set(&mut cache, &mut sink, "b", "2");
        set(&mut cache, &mut sink, "c", "3");

        assert!(cache.remove(b"a"), "remove from warm");
        assert!(cache.remove(b"c"), "remove from hot");
        assert!(!cache.remove(b"a"), "second remove finds nothing");
        assert!(!cache.contains(b"a"));
        assert!(!cache.contains(b"c"));
        assert!(cache.contains(b"b"));
    }

    #[test]
    fn test_capacity_bounds_hold() {
        let mut cache = TieredCache::new(3, 5);
        let mut sink = Spilled::new();
        for i in 0..100 {
            set(&mut cache, &mut sink, &format!("k{i}"), "v");
            assert!(cache.hot_len() <= 3);
            assert!(cache.warm_len() <= 5);
        }
        assert_eq!(cache.hot_len() + cache.warm_len() + sink.len(), 100);
    }

    #[test]
    fn test_zero_capacity_always_misses() {
        let mut cache = TieredCache::new(0, 0);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "k", "v");
        assert_eq!(get(&mut cache, &mut sink, "k"), None);
        assert!(!cache.remove(b"k"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_zero_warm_capacity_spills_directly() {
        let mut cache = TieredCache::new(2, 0);
        let mut sink = Spilled::new();
        set(&mut cache, &mut sink, "a", "1");
        set(&mut cache, &mut sink, "b", "2");
        set(&mut cache, &mut sink, "c", "3");
        assert_tiers(&cache, &["c", "b"], &[]);
        assert_eq!(sink, vec![(b"a".to_vec(), b"1".to_vec())]);
    }

    #[test]
    fn test_disjoint_residency_under_mixed_ops() {
        let mut cache = TieredCache::new(2, 3);
        let mut sink = Spilled::new();
        for i in 0..50u32 {
            let key = format!("k{}", i % 7);
            match i % 3 {
                0 => set(&mut cache, &mut sink, &key, "v"),
                1 => {
                    let _ = get(&mut cache, &mut sink, &key);
                }
                _ => {
                    let _ = cache.remove(key.as_bytes());
                }
            }
            for j in 0..7u32 {
                let k = format!("k{j}");
                assert!(
                    !(cache.hot_contains(k.as_bytes()) && cache.warm_contains(k.as_bytes())),
                    "{k} resident in both tiers"
                );
            }
        }
    }
}

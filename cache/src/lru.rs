//! A single LRU level.
//!
//! Keyed map plus a recency ordering with O(1) touch, insert, evict, and
//! remove. The ordering is an intrusive doubly-linked list threaded through
//! a [`Slab`] node arena; the map stores each key's slab index, which stays
//! stable for the life of the entry, so no pointer aliasing is involved.

use ahash::AHashMap;
use slab::Slab;

/// Sentinel slab index for "no node".
const NIL: usize = usize::MAX;

struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    prev: usize,
    next: usize,
}

/// One LRU level: front of the list is most-recent, back is least-recent.
pub struct LruLevel {
    map: AHashMap<Vec<u8>, usize>,
    nodes: Slab<Node>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl LruLevel {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: AHashMap::with_capacity(capacity.min(1024)),
            nodes: Slab::with_capacity(capacity.min(1024)),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.map.len(), self.nodes.len());
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Look up a value without touching recency. Promotion decisions are
    /// sequenced by the caller, so reads and touches are separate calls.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let idx = *self.map.get(key)?;
        Some(&self.nodes[idx].value)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Vec<u8>> {
        let idx = *self.map.get(key)?;
        Some(&mut self.nodes[idx].value)
    }

    /// Move `key` to the most-recent end. The key must be present.
    pub fn touch(&mut self, key: &[u8]) {
        if let Some(&idx) = self.map.get(key) {
            self.unlink(idx);
            self.push_front(idx);
        } else {
            debug_assert!(false, "touch on absent key");
        }
    }

    /// Insert a new entry at the most-recent end. The key must be absent
    /// and the level below capacity; the tiered policy guarantees both.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        debug_assert!(!self.map.contains_key(&key));
        debug_assert!(self.nodes.len() < self.capacity);
        let idx = self.nodes.insert(Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        });
        self.push_front(idx);
        self.map.insert(key, idx);
        debug_assert_eq!(self.map.len(), self.nodes.len());
    }

    /// Remove and return the least-recent entry.
    pub fn evict_lru(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        self.unlink(idx);
        let node = self.nodes.remove(idx);
        self.map.remove(&node.key);
        debug_assert_eq!(self.map.len(), self.nodes.len());
        Some((node.key, node.value))
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        let node = self.nodes.remove(idx);
        debug_assert_eq!(self.map.len(), self.nodes.len());
        Some(node.value)
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = &self.nodes[idx];
            (node.prev, node.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[idx];
            node.prev = NIL;
            node.next = old_head;
        }
        if old_head != NIL {
            self.nodes[old_head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    /// Walk the recency list front-to-back, yielding keys. Test-only; the
    /// hot paths never traverse.
    #[cfg(test)]
    fn ordering(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::with_capacity(self.nodes.len());
        let mut idx = self.head;
        while idx != NIL {
            keys.push(self.nodes[idx].key.clone());
            idx = self.nodes[idx].next;
        }
        keys
    }

    /// Verify map/list/arena agreement. Test-only.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let order = self.ordering();
        assert_eq!(order.len(), self.map.len());
        assert_eq!(order.len(), self.nodes.len());
        for key in &order {
            let idx = self.map[key];
            assert_eq!(&self.nodes[idx].key, key);
        }
    }
}

//! Bounded least-frequently-used store.

use std::collections::BTreeMap;
use std::hash::Hash;

use lru::LruCache;
use rustc_hash::FxHashMap;

/// Access counts saturate here so long-lived entries can still be displaced.
const MAX_FREQUENCY: u8 = 15;

struct Slot<V> {
    value: V,
    frequency: u8,
}

/// Map with a fixed capacity that evicts the least frequently used entry,
/// breaking frequency ties by least recent use.
///
/// Entries are bucketed by access count; each bucket is an unbounded
/// [`LruCache`] used purely as an ordered key set.
pub(crate) struct LfuStore<K, V> {
    capacity: usize,
    entries: FxHashMap<K, Slot<V>>,
    buckets: BTreeMap<u8, LruCache<K, ()>>,
}

impl<K: Hash + Eq + Clone, V> LfuStore<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: FxHashMap::default(),
            buckets: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Looks up `key` and counts the access.
    pub(crate) fn get(&mut self, key: &K) -> Option<&V> {
        let slot = self.entries.get_mut(key)?;
        let old = slot.frequency;
        let new = old.saturating_add(1).min(MAX_FREQUENCY);
        slot.frequency = new;
        Self::unlink(&mut self.buckets, old, key);
        self.buckets
            .entry(new)
            .or_insert_with(LruCache::unbounded)
            .put(key.clone(), ());
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Inserts or replaces `key`. Returns the entries evicted to make room.
    /// With zero capacity nothing is stored and nothing is evicted.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        if self.capacity == 0 {
            return Vec::new();
        }
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.value = value;
            return Vec::new();
        }
        let mut evicted = Vec::new();
        while self.entries.len() >= self.capacity {
            match self.evict_one() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        self.buckets
            .entry(1)
            .or_insert_with(LruCache::unbounded)
            .put(key.clone(), ());
        self.entries.insert(
            key,
            Slot {
                value,
                frequency: 1,
            },
        );
        evicted
    }

    /// Removes `key` when `remove` accepts its value.
    pub(crate) fn remove_if(&mut self, key: &K, remove: impl FnOnce(&V) -> bool) -> Option<V> {
        if !remove(&self.entries.get(key)?.value) {
            return None;
        }
        let slot = self.entries.remove(key)?;
        Self::unlink(&mut self.buckets, slot.frequency, key);
        Some(slot.value)
    }

    /// Drops everything, returning how many entries were held.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.buckets.clear();
        count
    }

    fn evict_one(&mut self) -> Option<(K, V)> {
        let mut lowest = self.buckets.first_entry()?;
        let popped = lowest.get_mut().pop_lru();
        if lowest.get().is_empty() {
            lowest.remove();
        }
        let (key, ()) = popped?;
        let slot = self.entries.remove(&key)?;
        Some((key, slot.value))
    }

    fn unlink(buckets: &mut BTreeMap<u8, LruCache<K, ()>>, frequency: u8, key: &K) {
        if let Some(bucket) = buckets.get_mut(&frequency) {
            bucket.pop(key);
            if bucket.is_empty() {
                buckets.remove(&frequency);
            }
        }
    }
}

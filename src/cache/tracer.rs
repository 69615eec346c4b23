//! Cache event sinks.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Receives cache events. Every method defaults to a no-op so sinks only
/// implement what they care about.
pub trait CacheTracer<K>: Send + Sync {
    /// A lookup was answered from the cache.
    fn cache_hit(&self, _key: &K) {}
    /// A lookup found nothing usable.
    fn cache_miss(&self, _key: &K) {}
    /// A value was computed.
    fn compute(&self, _key: &K) {}
    /// A computed value was not admitted to the cache.
    fn discard(&self, _key: &K) {}
    /// A cached value was found stale and dropped.
    fn cache_stale(&self, _key: &K, _seconds_since_replan: u64, _reason: Option<&str>) {}
    /// An entry was evicted to make room.
    fn eviction(&self, _key: &K) {}
    /// The cache was cleared.
    fn cache_flush(&self, _entries: usize) {}
}

/// Sink that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCacheTracer;

impl<K> CacheTracer<K> for NoopCacheTracer {}

/// Counters of one cache tier.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Values computed.
    pub compiles: u64,
    /// Computed values not admitted.
    pub discards: u64,
    /// Entries found stale.
    pub stale: u64,
    /// Entries evicted for capacity.
    pub evictions: u64,
    /// Clears.
    pub flushes: u64,
}

/// Sink counting every event kind.
#[derive(Debug, Default)]
pub struct CountingCacheTracer {
    hits: AtomicU64,
    misses: AtomicU64,
    compiles: AtomicU64,
    discards: AtomicU64,
    stale: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

impl CountingCacheTracer {
    /// Fresh counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values.
    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

impl<K> CacheTracer<K> for CountingCacheTracer {
    fn cache_hit(&self, _key: &K) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_miss(&self, _key: &K) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn compute(&self, _key: &K) {
        self.compiles.fetch_add(1, Ordering::Relaxed);
    }

    fn discard(&self, _key: &K) {
        self.discards.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_stale(&self, _key: &K, _seconds_since_replan: u64, _reason: Option<&str>) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    fn eviction(&self, _key: &K) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_flush(&self, _entries: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

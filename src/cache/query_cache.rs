//! One bounded cache tier with single-flight computation.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};

use super::lfu::LfuStore;
use super::staleness::ReusabilityState;
use super::tracer::{CacheMetrics, CacheTracer, CountingCacheTracer, NoopCacheTracer};
use super::CacheKind;
use crate::types::Result;

/// Values a cache tier may hold.
pub trait Cacheable: Clone + Send + Sync {
    /// Whether a freshly computed value should be admitted.
    fn should_be_cached(&self) -> bool {
        true
    }
}

impl<T: ?Sized + Send + Sync> Cacheable for Arc<T> {}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    generation: u64,
}

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Bounded least-frequently-used cache tier.
///
/// [`QueryCache::compute_if_absent`] runs `compute` at most once at a time
/// per key: the first caller becomes the leader and computes, callers racing
/// on the same key wait for the leader and share its value. When the leader
/// fails, a waiting caller takes over.
///
/// Lock order is `in_flight` before `store`. The store is allocated on the
/// first admitted value, so a zero-capacity tier never holds one.
pub struct QueryCache<K, V> {
    kind: CacheKind,
    capacity: usize,
    store: Mutex<Option<LfuStore<K, Entry<V>>>>,
    in_flight: Mutex<FxHashMap<K, Slot<V>>>,
    generations: AtomicU64,
    counters: CountingCacheTracer,
    tracer: Arc<dyn CacheTracer<K>>,
}

impl<K, V> QueryCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Cacheable,
{
    /// Tier holding at most `capacity` entries. Zero capacity caches nothing.
    pub fn new(kind: CacheKind, capacity: usize) -> Self {
        Self::with_tracer(kind, capacity, Arc::new(NoopCacheTracer))
    }

    /// Tier reporting events to `tracer` in addition to its own counters.
    pub fn with_tracer(kind: CacheKind, capacity: usize, tracer: Arc<dyn CacheTracer<K>>) -> Self {
        Self {
            kind,
            capacity,
            store: Mutex::new(None),
            in_flight: Mutex::new(FxHashMap::default()),
            generations: AtomicU64::new(0),
            counters: CountingCacheTracer::new(),
            tracer,
        }
    }

    /// Tier kind.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Cached value for `key`, computing it on a miss. With `condition`
    /// false the cache is bypassed entirely.
    pub fn compute_if_absent<F>(&self, condition: bool, key: &K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        self.compute_if_absent_or_stale(condition, key, |_, _| ReusabilityState::Reusable, compute)
    }

    /// Like [`Self::compute_if_absent`], but a cached value is first checked
    /// with `staleness`; a stale value is evicted and recomputed.
    pub fn compute_if_absent_or_stale<S, F>(
        &self,
        condition: bool,
        key: &K,
        staleness: S,
        compute: F,
    ) -> Result<V>
    where
        S: Fn(&K, &V) -> ReusabilityState,
        F: FnOnce() -> Result<V>,
    {
        if !condition {
            self.event_compute(key);
            return compute();
        }

        loop {
            let mut in_flight = self.in_flight.lock();
            let cached = self
                .store
                .lock()
                .as_mut()
                .and_then(|store| store.get(key).cloned());
            if let Some(entry) = cached {
                drop(in_flight);
                match staleness(key, &entry.value) {
                    ReusabilityState::Reusable => {
                        self.event_hit(key);
                        return Ok(entry.value);
                    }
                    ReusabilityState::NeedsReplan {
                        seconds_since_replan,
                        reason,
                    } => {
                        self.event_stale(key, seconds_since_replan, reason.as_deref());
                        let _in_flight = self.in_flight.lock();
                        if let Some(store) = self.store.lock().as_mut() {
                            store.remove_if(key, |current| current.generation == entry.generation);
                        }
                        continue;
                    }
                }
            }

            if let Some(slot) = in_flight.get(key).cloned() {
                drop(in_flight);
                let finished = slot.lock().clone();
                match finished {
                    Some(value) => {
                        self.event_hit(key);
                        return Ok(value);
                    }
                    None => {
                        // The leader failed; clear its slot and race again.
                        let mut in_flight = self.in_flight.lock();
                        if in_flight.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                            in_flight.remove(key);
                        }
                        continue;
                    }
                }
            }

            let slot: Slot<V> = Arc::new(Mutex::new(None));
            let mut result = slot.lock_arc();
            in_flight.insert(key.clone(), Arc::clone(&slot));
            drop(in_flight);

            self.event_miss(key);
            self.event_compute(key);
            let computed = compute();

            let mut in_flight = self.in_flight.lock();
            if let Ok(value) = &computed {
                if value.should_be_cached() && self.capacity > 0 {
                    let entry = Entry {
                        value: value.clone(),
                        generation: self.generations.fetch_add(1, Ordering::Relaxed),
                    };
                    let evicted = self
                        .store
                        .lock()
                        .get_or_insert_with(|| LfuStore::new(self.capacity))
                        .insert(key.clone(), entry);
                    for (evicted_key, _) in evicted {
                        self.event_eviction(&evicted_key);
                    }
                } else {
                    self.event_discard(key);
                }
                *result = Some(value.clone());
            }
            if in_flight.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                in_flight.remove(key);
            }
            drop(in_flight);
            drop(result);
            return computed;
        }
    }

    /// Number of cached entries.
    pub fn estimated_size(&self) -> usize {
        self.store.lock().as_ref().map_or(0, |store| store.len())
    }

    /// Whether the backing store has been allocated.
    pub(crate) fn is_allocated(&self) -> bool {
        self.store.lock().is_some()
    }

    /// Drops every entry, returning how many were held.
    pub fn clear(&self) -> usize {
        let _in_flight = self.in_flight.lock();
        let count = self.store.lock().as_mut().map_or(0, |store| store.clear());
        <CountingCacheTracer as CacheTracer<K>>::cache_flush(&self.counters, count);
        self.tracer.cache_flush(count);
        debug!(cache = %self.kind, entries = count, "cache.flush");
        count
    }

    /// Counters since creation.
    pub fn metrics(&self) -> CacheMetrics {
        self.counters.metrics()
    }

    fn event_hit(&self, key: &K) {
        self.counters.cache_hit(key);
        self.tracer.cache_hit(key);
        trace!(cache = %self.kind, key = ?key, "cache.hit");
    }

    fn event_miss(&self, key: &K) {
        self.counters.cache_miss(key);
        self.tracer.cache_miss(key);
        trace!(cache = %self.kind, key = ?key, "cache.miss");
    }

    fn event_compute(&self, key: &K) {
        self.counters.compute(key);
        self.tracer.compute(key);
    }

    fn event_discard(&self, key: &K) {
        self.counters.discard(key);
        self.tracer.discard(key);
        trace!(cache = %self.kind, key = ?key, "cache.discard");
    }

    fn event_stale(&self, key: &K, seconds_since_replan: u64, reason: Option<&str>) {
        self.counters.cache_stale(key, seconds_since_replan, reason);
        self.tracer.cache_stale(key, seconds_since_replan, reason);
        info!(
            cache = %self.kind,
            key = ?key,
            seconds_since_replan,
            reason = reason.unwrap_or("unknown"),
            "cache.stale"
        );
    }

    fn event_eviction(&self, key: &K) {
        self.counters.eviction(key);
        self.tracer.eviction(key);
        debug!(cache = %self.kind, key = ?key, "cache.evict");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::types::PenumbraError;

    #[derive(Clone, Debug, PartialEq)]
    struct Value(u32, bool);

    impl Cacheable for Value {
        fn should_be_cached(&self) -> bool {
            self.1
        }
    }

    #[test]
    fn second_lookup_hits() {
        let cache: QueryCache<&str, Value> = QueryCache::new(CacheKind::Ast, 8);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = cache
                .compute_if_absent(true, &"q", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value(7, true))
                })
                .expect("value");
            assert_eq!(value, Value(7, true));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let metrics = cache.metrics();
        assert_eq!((metrics.hits, metrics.misses, metrics.compiles), (2, 1, 1));
    }

    #[test]
    fn condition_false_and_uncacheable_values_bypass_the_store() {
        let cache: QueryCache<&str, Value> = QueryCache::new(CacheKind::LogicalPlan, 8);
        cache
            .compute_if_absent(false, &"a", || Ok(Value(1, true)))
            .expect("value");
        cache
            .compute_if_absent(true, &"b", || Ok(Value(2, false)))
            .expect("value");
        assert_eq!(cache.estimated_size(), 0);
        assert_eq!(cache.metrics().discards, 1);
    }

    #[test]
    fn failed_compute_is_not_cached() {
        let cache: QueryCache<&str, Value> = QueryCache::new(CacheKind::Ast, 8);
        let err = cache
            .compute_if_absent(true, &"q", || Err(PenumbraError::Invalid("boom")))
            .expect_err("fails");
        assert!(matches!(err, PenumbraError::Invalid("boom")));
        let value = cache
            .compute_if_absent(true, &"q", || Ok(Value(3, true)))
            .expect("value");
        assert_eq!(value.0, 3);
        assert_eq!(cache.estimated_size(), 1);
    }

    #[test]
    fn stale_entry_is_recomputed_once() {
        let cache: QueryCache<&str, Value> = QueryCache::new(CacheKind::LogicalPlan, 8);
        cache
            .compute_if_absent(true, &"q", || Ok(Value(1, true)))
            .expect("value");
        let stale_when_old = |_: &&str, v: &Value| {
            if v.0 == 1 {
                ReusabilityState::NeedsReplan {
                    seconds_since_replan: 12,
                    reason: Some("drift".into()),
                }
            } else {
                ReusabilityState::Reusable
            }
        };
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let value = cache
                .compute_if_absent_or_stale(true, &"q", stale_when_old, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value(2, true))
                })
                .expect("value");
            assert_eq!(value.0, 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics().stale, 1);
    }

    #[test]
    fn capacity_evictions_and_clear_are_counted() {
        let cache: QueryCache<u32, Value> = QueryCache::new(CacheKind::PreParser, 2);
        for key in 0..4 {
            cache
                .compute_if_absent(true, &key, || Ok(Value(key, true)))
                .expect("value");
        }
        assert_eq!(cache.estimated_size(), 2);
        assert_eq!(cache.metrics().evictions, 2);
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.metrics().flushes, 1);
        assert_eq!(cache.estimated_size(), 0);
    }

    #[test]
    fn zero_capacity_never_allocates_a_store() {
        let cache: QueryCache<&str, Value> = QueryCache::new(CacheKind::ExecutionPlan, 0);
        for _ in 0..3 {
            cache
                .compute_if_absent(true, &"q", || Ok(Value(1, true)))
                .expect("value");
        }
        assert!(!cache.is_allocated());
        assert_eq!(cache.clear(), 0);
        let metrics = cache.metrics();
        assert_eq!((metrics.compiles, metrics.discards, metrics.flushes), (3, 3, 1));

        let sized: QueryCache<&str, Value> = QueryCache::new(CacheKind::ExecutionPlan, 4);
        assert!(!sized.is_allocated());
        sized
            .compute_if_absent(true, &"q", || Ok(Value(1, true)))
            .expect("value");
        assert!(sized.is_allocated());
        assert_eq!(sized.estimated_size(), 1);
    }
}

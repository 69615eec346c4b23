#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use penumbra::cache::{
    CacheConfig, CacheKind, ExecutionPlanCacheKey, ExecutionPlanCacheSize, ManualClock,
    QueryCache, QueryCaches, ReusabilityState, StalenessCaller,
};
use penumbra::query::expr::Var;
use penumbra::query::metadata::InMemoryMetadata;
use penumbra::query::producer::PlanProducer;
use penumbra::Result;

const NUM_THREADS: usize = 8;

#[test]
fn concurrent_misses_compute_once() -> Result<()> {
    let cache: Arc<QueryCache<String, Arc<String>>> =
        Arc::new(QueryCache::new(CacheKind::LogicalPlan, 16));
    let computations = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computations = Arc::clone(&computations);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<Arc<String>> {
                barrier.wait();
                cache.compute_if_absent(true, &"MATCH (n) RETURN n".to_owned(), || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    Ok(Arc::new("plan".to_owned()))
                })
            })
        })
        .collect();

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.join().expect("thread panicked")?);
    }

    assert_eq!(computations.load(Ordering::SeqCst), 1);
    let first = &values[0];
    assert!(values.iter().all(|v| Arc::ptr_eq(v, first)));
    let metrics = cache.metrics();
    assert_eq!(metrics.compiles, 1);
    assert_eq!(metrics.hits + metrics.misses, NUM_THREADS as u64);
    Ok(())
}

#[test]
fn concurrent_lookups_of_stale_entry_recompute_once() -> Result<()> {
    let cache: Arc<QueryCache<String, Arc<u32>>> =
        Arc::new(QueryCache::new(CacheKind::ExecutableQuery, 16));
    let key = "MATCH (n) RETURN n".to_owned();
    cache.compute_if_absent(true, &key, || Ok(Arc::new(1)))?;

    let computations = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computations = Arc::clone(&computations);
            let barrier = Arc::clone(&barrier);
            let key = key.clone();
            thread::spawn(move || -> Result<Arc<u32>> {
                barrier.wait();
                cache.compute_if_absent_or_stale(
                    true,
                    &key,
                    |_, cached: &Arc<u32>| {
                        if **cached == 1 {
                            ReusabilityState::NeedsReplan {
                                seconds_since_replan: 60,
                                reason: Some("drift".into()),
                            }
                        } else {
                            ReusabilityState::Reusable
                        }
                    },
                    || {
                        computations.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(Arc::new(2))
                    },
                )
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(*handle.join().expect("thread panicked")?, 2);
    }
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(cache.estimated_size(), 1);
    assert!(cache.metrics().stale >= 1);
    Ok(())
}

#[test]
fn distinct_keys_compute_in_parallel() -> Result<()> {
    let cache: Arc<QueryCache<u32, Arc<u32>>> = Arc::new(QueryCache::new(CacheKind::Ast, 64));
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let handles: Vec<_> = (0..NUM_THREADS as u32)
        .map(|key| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<Arc<u32>> {
                barrier.wait();
                cache.compute_if_absent(true, &key, || Ok(Arc::new(key * 10)))
            })
        })
        .collect();
    for (key, handle) in handles.into_iter().enumerate() {
        assert_eq!(*handle.join().expect("thread panicked")?, key as u32 * 10);
    }
    assert_eq!(cache.estimated_size(), NUM_THREADS);
    Ok(())
}

#[test]
fn zero_sized_execution_plan_tier_always_builds() -> Result<()> {
    let config =
        CacheConfig::default().with_execution_plan_cache_size(ExecutionPlanCacheSize::Sized(0));
    let staleness = StalenessCaller::new(
        Arc::new(ManualClock::new(0)),
        Arc::new(|| 1),
        Arc::new(InMemoryMetadata::new()),
        config.divergence.calculator(),
    );
    let caches: QueryCaches<String, String, String> = QueryCaches::new(&config, staleness)?;

    let producer = PlanProducer::new();
    let plan = producer.all_nodes_scan(&Var::new("n"), &Default::default());
    let key = ExecutionPlanCacheKey::for_plan("slotted", &plan);

    let builds = AtomicUsize::new(0);
    for _ in 0..3 {
        let built = caches.execution_plan(&key, || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok("execution plan".to_owned())
        })?;
        assert_eq!(built.as_str(), "execution plan");
    }
    assert_eq!(builds.load(Ordering::SeqCst), 3);

    let stats = caches.statistics();
    assert_eq!(stats.execution_plan_cache_entries(), 0);
    let metrics = &stats.metrics_per_cache_kind()[&CacheKind::ExecutionPlan];
    assert_eq!(metrics.compiles, 3);
    assert_eq!(metrics.discards, 3);
    Ok(())
}

//! The five cache tiers of query compilation.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::{CacheKey, ExecutionPlanCacheKey};
use super::preparse::{PreParsedQuery, PreParser, QueryOptions, ReplanOption};
use super::query_cache::{Cacheable, QueryCache};
use super::staleness::{PlanFingerprintReference, ReusabilityState, StalenessCaller};
use super::tracer::{CacheMetrics, CacheTracer, NoopCacheTracer};
use super::CacheKind;
use crate::query::logical::LogicalPlan;
use crate::query::metadata::GraphStatisticsSnapshot;
use crate::types::Result;

/// Logical plan as stored in the logical-plan tier.
#[derive(Clone, Debug)]
pub struct CachedLogicalPlan {
    /// The plan.
    pub plan: LogicalPlan,
    /// Staleness state; plans without one never go stale.
    pub fingerprint: Option<Arc<PlanFingerprintReference>>,
    /// Whether the plan may be cached at all.
    pub should_be_cached: bool,
}

impl CachedLogicalPlan {
    /// Cacheable plan with staleness tracking.
    pub fn new(plan: LogicalPlan, fingerprint: Arc<PlanFingerprintReference>) -> Self {
        Self {
            plan,
            fingerprint: Some(fingerprint),
            should_be_cached: true,
        }
    }

    /// Plan that is returned but never stored.
    pub fn uncacheable(plan: LogicalPlan) -> Self {
        Self {
            plan,
            fingerprint: None,
            should_be_cached: false,
        }
    }
}

impl Cacheable for CachedLogicalPlan {
    fn should_be_cached(&self) -> bool {
        self.should_be_cached
    }
}

/// Executable query as stored in the executable-query tier.
#[derive(Debug)]
pub struct CachedExecutableQuery<X> {
    /// The executable query.
    pub query: Arc<X>,
    /// Staleness state of the plan it was built from.
    pub fingerprint: Option<Arc<PlanFingerprintReference>>,
    /// Whether the query may be cached at all.
    pub should_be_cached: bool,
}

impl<X> Clone for CachedExecutableQuery<X> {
    fn clone(&self) -> Self {
        Self {
            query: Arc::clone(&self.query),
            fingerprint: self.fingerprint.clone(),
            should_be_cached: self.should_be_cached,
        }
    }
}

impl<X: Send + Sync> Cacheable for CachedExecutableQuery<X> {
    fn should_be_cached(&self) -> bool {
        self.should_be_cached
    }
}

/// Optional per-tier event sinks. Counting happens regardless.
pub struct QueryCacheTracers<A> {
    /// Pre-parser tier sink.
    pub pre_parser: Arc<dyn CacheTracer<String>>,
    /// Syntax-tree tier sink.
    pub ast: Arc<dyn CacheTracer<CacheKey<String>>>,
    /// Logical-plan tier sink.
    pub logical_plan: Arc<dyn CacheTracer<CacheKey<Arc<A>>>>,
    /// Execution-plan tier sink.
    pub execution_plan: Arc<dyn CacheTracer<ExecutionPlanCacheKey>>,
    /// Executable-query tier sink.
    pub executable_query: Arc<dyn CacheTracer<CacheKey<String>>>,
}

impl<A> Default for QueryCacheTracers<A> {
    fn default() -> Self {
        Self {
            pre_parser: Arc::new(NoopCacheTracer),
            ast: Arc::new(NoopCacheTracer),
            logical_plan: Arc::new(NoopCacheTracer),
            execution_plan: Arc::new(NoopCacheTracer),
            executable_query: Arc::new(NoopCacheTracer),
        }
    }
}

/// Entry counts and metrics of every tier.
#[derive(Clone, Debug, Serialize)]
pub struct QueryCacheStatistics {
    entries: BTreeMap<CacheKind, usize>,
    metrics: BTreeMap<CacheKind, CacheMetrics>,
}

impl QueryCacheStatistics {
    fn entries_of(&self, kind: CacheKind) -> usize {
        self.entries.get(&kind).copied().unwrap_or(0)
    }

    /// Pre-parser tier entries.
    pub fn pre_parser_cache_entries(&self) -> usize {
        self.entries_of(CacheKind::PreParser)
    }

    /// Syntax-tree tier entries.
    pub fn ast_cache_entries(&self) -> usize {
        self.entries_of(CacheKind::Ast)
    }

    /// Logical-plan tier entries.
    pub fn logical_plan_cache_entries(&self) -> usize {
        self.entries_of(CacheKind::LogicalPlan)
    }

    /// Execution-plan tier entries.
    pub fn execution_plan_cache_entries(&self) -> usize {
        self.entries_of(CacheKind::ExecutionPlan)
    }

    /// Executable-query tier entries.
    pub fn executable_query_cache_entries(&self) -> usize {
        self.entries_of(CacheKind::ExecutableQuery)
    }

    /// Counters per tier.
    pub fn metrics_per_cache_kind(&self) -> &BTreeMap<CacheKind, CacheMetrics> {
        &self.metrics
    }
}

/// All cache tiers of query compilation.
///
/// `A` is the syntax tree produced by the embedder's parser, `E` its
/// execution plan and `X` its executable query. The syntax tree doubles as
/// the logical-plan key, so differently written queries with equal trees
/// share a plan.
pub struct QueryCaches<A, E, X> {
    pre_parser: QueryCache<String, Arc<PreParsedQuery>>,
    ast: QueryCache<CacheKey<String>, Arc<A>>,
    logical_plan: QueryCache<CacheKey<Arc<A>>, CachedLogicalPlan>,
    execution_plan: QueryCache<ExecutionPlanCacheKey, Arc<E>>,
    executable_query: QueryCache<CacheKey<String>, CachedExecutableQuery<X>>,
    staleness: StalenessCaller,
}

impl<A, E, X> QueryCaches<A, E, X>
where
    A: Hash + Eq + std::fmt::Debug + Send + Sync + 'static,
    E: Send + Sync + 'static,
    X: Send + Sync + 'static,
{
    /// Builds the tiers after validating `config`.
    pub fn new(config: &CacheConfig, staleness: StalenessCaller) -> Result<Self> {
        Self::with_tracers(config, staleness, QueryCacheTracers::default())
    }

    /// Builds the tiers with custom event sinks.
    pub fn with_tracers(
        config: &CacheConfig,
        staleness: StalenessCaller,
        tracers: QueryCacheTracers<A>,
    ) -> Result<Self> {
        config.validate()?;
        debug!(
            pre_parser = config.pre_parser_cache_size,
            ast = config.ast_cache_size,
            logical_plan = config.logical_plan_cache_size,
            execution_plan = config.execution_plan_capacity(),
            executable_query = config.executable_query_cache_size,
            "cache.init"
        );
        Ok(Self {
            pre_parser: QueryCache::with_tracer(
                CacheKind::PreParser,
                config.pre_parser_cache_size,
                tracers.pre_parser,
            ),
            ast: QueryCache::with_tracer(CacheKind::Ast, config.ast_cache_size, tracers.ast),
            logical_plan: QueryCache::with_tracer(
                CacheKind::LogicalPlan,
                config.logical_plan_cache_size,
                tracers.logical_plan,
            ),
            execution_plan: QueryCache::with_tracer(
                CacheKind::ExecutionPlan,
                config.execution_plan_capacity(),
                tracers.execution_plan,
            ),
            executable_query: QueryCache::with_tracer(
                CacheKind::ExecutableQuery,
                config.executable_query_cache_size,
                tracers.executable_query,
            ),
            staleness,
        })
    }

    /// Pre-parses `text`, cached by the raw text.
    pub fn pre_parse(&self, text: &str, parser: &PreParser) -> Result<Arc<PreParsedQuery>> {
        self.pre_parser
            .compute_if_absent(true, &text.to_owned(), || parser.pre_parse(text).map(Arc::new))
    }

    /// Syntax tree for `key`, parsed on a miss.
    pub fn ast<F>(&self, options: &QueryOptions, key: &CacheKey<String>, parse: F) -> Result<Arc<A>>
    where
        F: FnOnce() -> Result<A>,
    {
        self.ast
            .compute_if_absent(use_cache(options), key, || parse().map(Arc::new))
    }

    /// Logical plan for `key`, planned on a miss or when the cached plan went
    /// stale.
    pub fn logical_plan<F>(
        &self,
        options: &QueryOptions,
        key: &CacheKey<Arc<A>>,
        plan: F,
    ) -> Result<CachedLogicalPlan>
    where
        F: FnOnce() -> Result<CachedLogicalPlan>,
    {
        self.logical_plan.compute_if_absent_or_stale(
            use_cache(options),
            key,
            |_, cached| self.reusability(options, cached.fingerprint.as_deref()),
            plan,
        )
    }

    /// Execution plan for `key`, built on a miss. A zero-sized tier never
    /// allocates its store and every call builds.
    pub fn execution_plan<F>(&self, key: &ExecutionPlanCacheKey, build: F) -> Result<Arc<E>>
    where
        F: FnOnce() -> Result<E>,
    {
        self.execution_plan
            .compute_if_absent(true, key, || build().map(Arc::new))
    }

    /// Executable query for `key`, built on a miss or when stale.
    pub fn executable_query<F>(
        &self,
        options: &QueryOptions,
        key: &CacheKey<String>,
        build: F,
    ) -> Result<CachedExecutableQuery<X>>
    where
        F: FnOnce() -> Result<CachedExecutableQuery<X>>,
    {
        self.executable_query.compute_if_absent_or_stale(
            use_cache(options),
            key,
            |_, cached| self.reusability(options, cached.fingerprint.as_deref()),
            build,
        )
    }

    /// Fingerprint for a plan created now from the statistics it read.
    pub fn fingerprint(&self, snapshot: GraphStatisticsSnapshot) -> Arc<PlanFingerprintReference> {
        Arc::new(PlanFingerprintReference::new(
            self.staleness.fingerprint(snapshot),
        ))
    }

    /// Entry counts and metrics of every tier.
    pub fn statistics(&self) -> QueryCacheStatistics {
        let entries = BTreeMap::from([
            (CacheKind::PreParser, self.pre_parser.estimated_size()),
            (CacheKind::Ast, self.ast.estimated_size()),
            (CacheKind::LogicalPlan, self.logical_plan.estimated_size()),
            (CacheKind::ExecutionPlan, self.execution_plan.estimated_size()),
            (CacheKind::ExecutableQuery, self.executable_query.estimated_size()),
        ]);
        let metrics = BTreeMap::from([
            (CacheKind::PreParser, self.pre_parser.metrics()),
            (CacheKind::Ast, self.ast.metrics()),
            (CacheKind::LogicalPlan, self.logical_plan.metrics()),
            (CacheKind::ExecutionPlan, self.execution_plan.metrics()),
            (CacheKind::ExecutableQuery, self.executable_query.metrics()),
        ]);
        QueryCacheStatistics { entries, metrics }
    }

    /// Clears every tier, returning the number of dropped entries.
    pub fn clear_all(&self) -> usize {
        self.pre_parser.clear()
            + self.ast.clear()
            + self.logical_plan.clear()
            + self.execution_plan.clear()
            + self.executable_query.clear()
    }

    fn reusability(
        &self,
        options: &QueryOptions,
        fingerprint: Option<&PlanFingerprintReference>,
    ) -> ReusabilityState {
        match (options.replan, fingerprint) {
            (ReplanOption::Skip, _) | (_, None) => ReusabilityState::Reusable,
            (_, Some(reference)) => self.staleness.reusability(reference),
        }
    }
}

fn use_cache(options: &QueryOptions) -> bool {
    options.replan != ReplanOption::Force
}

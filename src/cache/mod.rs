#![forbid(unsafe_code)]

//! Tiered query caches.
//!
//! Compilation results are memoized in five tiers: pre-parsed text, syntax
//! trees, logical plans, execution plans and executable queries. Every tier
//! is a bounded [`QueryCache`] with least-frequently-used eviction and
//! single-flight computation per key. The logical-plan and executable-query
//! tiers additionally consult a [`StalenessCaller`] before reusing an entry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Cache tier facade.
pub mod caches;

/// Tier sizes and staleness settings.
pub mod config;

/// Cache keys.
pub mod keys;

mod lfu;

/// Query option pre-parsing.
pub mod preparse;

/// Single cache tier.
pub mod query_cache;

/// Staleness checks for cached plans.
pub mod staleness;

/// Cache event sinks and counters.
pub mod tracer;

pub use caches::{
    CachedExecutableQuery, CachedLogicalPlan, QueryCacheStatistics, QueryCacheTracers, QueryCaches,
};
pub use config::{CacheConfig, DivergenceConfig, ExecutionPlanCacheSize};
pub use keys::{CacheKey, ExecutionPlanCacheKey, ParameterType};
pub use preparse::{PreParsedQuery, PreParser, QueryOptions, ReplanOption};
pub use query_cache::{Cacheable, QueryCache};
pub use staleness::{
    Clock, DivergenceAlgorithm, ManualClock, PlanFingerprint, PlanFingerprintReference,
    ReusabilityState, StalenessCaller, StatsDivergenceCalculator, SystemClock,
};
pub use tracer::{CacheMetrics, CacheTracer, CountingCacheTracer, NoopCacheTracer};

/// Identifies a cache tier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Raw text to pre-parsed query.
    PreParser,
    /// Pre-parsed query to syntax tree.
    Ast,
    /// Syntax tree to logical plan.
    LogicalPlan,
    /// Logical plan to execution plan.
    ExecutionPlan,
    /// Query to executable query.
    ExecutableQuery,
}

impl CacheKind {
    /// Stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::PreParser => "pre_parser",
            CacheKind::Ast => "ast",
            CacheKind::LogicalPlan => "logical_plan",
            CacheKind::ExecutionPlan => "execution_plan",
            CacheKind::ExecutableQuery => "executable_query",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

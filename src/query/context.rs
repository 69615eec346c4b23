//! Planner configuration, per-query planning context and the planner kit.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::cost::{CostBasedRanker, PlanRanker};
use crate::query::expr::Predicate;
use crate::query::graph::QueryGraph;
use crate::query::leaf::{DefaultLeafPlanner, LeafPlanProvider};
use crate::query::logical::LogicalPlan;
use crate::query::metadata::{GraphStatisticsSnapshot, InstrumentedMetadata, PlanningMetadata};
use crate::query::producer::PlanProducer;

/// Default IDP table budget.
pub const DEFAULT_IDP_MAX_TABLE_SIZE: usize = 128;
/// Default IDP per-iteration time budget.
pub const DEFAULT_IDP_ITERATION_DURATION: Duration = Duration::from_millis(1000);

/// Knobs of the join enumerator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Table size after which an iteration stops growing blocks.
    pub idp_max_table_size: usize,
    /// Wall-clock budget of one iteration.
    pub idp_iteration_duration: Duration,
    /// Whether hash joins are generated while enumerating join orders.
    pub enable_hash_joins: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            idp_max_table_size: DEFAULT_IDP_MAX_TABLE_SIZE,
            idp_iteration_duration: DEFAULT_IDP_ITERATION_DURATION,
            enable_hash_joins: true,
        }
    }
}

impl PlannerConfig {
    /// Overrides the table budget.
    pub fn idp_max_table_size(mut self, size: usize) -> Self {
        self.idp_max_table_size = size;
        self
    }

    /// Overrides the iteration time budget.
    pub fn idp_iteration_duration(mut self, duration: Duration) -> Self {
        self.idp_iteration_duration = duration;
        self
    }

    /// Enables or disables hash joins.
    pub fn enable_hash_joins(mut self, enabled: bool) -> Self {
        self.enable_hash_joins = enabled;
        self
    }
}

/// State shared by every planning step of one query.
///
/// Statistics reads are recorded, so the snapshot returned by
/// [`PlanningContext::statistics_snapshot`] lists exactly the values the
/// chosen plan was costed against.
pub struct PlanningContext {
    metadata: InstrumentedMetadata,
    config: PlannerConfig,
    producer: PlanProducer,
}

impl PlanningContext {
    /// Creates a context reading statistics from `metadata`.
    pub fn new(metadata: Arc<dyn PlanningMetadata>, config: PlannerConfig) -> Self {
        Self {
            metadata: InstrumentedMetadata::new(metadata),
            config,
            producer: PlanProducer::new(),
        }
    }

    /// Statistics and schema.
    pub fn metadata(&self) -> &dyn PlanningMetadata {
        &self.metadata
    }

    /// Planner configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan node constructor.
    pub fn producer(&self) -> &PlanProducer {
        &self.producer
    }

    /// Statistics read so far.
    pub fn statistics_snapshot(&self) -> GraphStatisticsSnapshot {
        self.metadata.snapshot()
    }
}

/// Pluggable collaborators of the planner.
#[derive(Clone)]
pub struct QueryPlannerKit {
    /// Leaf enumeration.
    pub leaf_planner: Arc<dyn LeafPlanProvider>,
    /// Candidate ranking.
    pub ranker: Arc<dyn PlanRanker>,
}

impl Default for QueryPlannerKit {
    fn default() -> Self {
        Self {
            leaf_planner: Arc::new(DefaultLeafPlanner),
            ranker: Arc::new(CostBasedRanker::default()),
        }
    }
}

impl QueryPlannerKit {
    /// Kit with custom collaborators.
    pub fn new(leaf_planner: Arc<dyn LeafPlanProvider>, ranker: Arc<dyn PlanRanker>) -> Self {
        Self {
            leaf_planner,
            ranker,
        }
    }

    /// Applies everything of `qg` that `plan` can solve but has not yet:
    /// shortest-path patterns whose endpoints are bound, then predicates
    /// whose dependencies are available. Repeats until nothing changes, so
    /// predicates on shortest-path variables are picked up.
    pub fn select(&self, plan: LogicalPlan, qg: &QueryGraph, ctx: &PlanningContext) -> LogicalPlan {
        let mut plan = plan;
        loop {
            let before = plan.id;
            for pattern in &qg.shortest_relationship_patterns {
                let endpoints_bound = plan.available_symbols.contains(&pattern.rel.left)
                    && plan.available_symbols.contains(&pattern.rel.right);
                let names_free = pattern
                    .names()
                    .iter()
                    .all(|n| !plan.available_symbols.contains(n));
                if endpoints_bound && names_free && !plan.solved.shortest.contains(pattern) {
                    plan = ctx.producer().shortest_path(&plan, pattern);
                }
            }
            let solvable: BTreeSet<Predicate> = qg
                .selections
                .iter()
                .filter(|p| {
                    !plan.solved.predicates.contains(*p)
                        && p.is_solvable_with(&plan.available_symbols)
                })
                .cloned()
                .collect();
            plan = ctx.producer().selection(&plan, solvable);
            if plan.id == before {
                return plan;
            }
        }
    }

    /// Best of `candidates` according to the ranker.
    pub fn pick_best(&self, candidates: Vec<LogicalPlan>, ctx: &PlanningContext) -> Option<LogicalPlan> {
        self.ranker.select_best(candidates, ctx.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{Expression, Var};
    use crate::query::graph::{PatternRelationship, SemanticDirection, ShortestRelationshipPattern};
    use crate::query::metadata::InMemoryMetadata;

    #[test]
    fn config_builder_and_serde_defaults() {
        let config = PlannerConfig::default()
            .idp_max_table_size(16)
            .enable_hash_joins(false);
        assert_eq!(config.idp_max_table_size, 16);
        assert!(!config.enable_hash_joins);

        let parsed: PlannerConfig =
            serde_json::from_str(r#"{"idp_max_table_size": 4}"#).expect("parse");
        assert_eq!(parsed.idp_max_table_size, 4);
        assert_eq!(parsed.idp_iteration_duration, DEFAULT_IDP_ITERATION_DURATION);
    }

    #[test]
    fn select_applies_shortest_path_then_dependent_predicate() {
        let ctx = PlanningContext::new(Arc::new(InMemoryMetadata::new()), PlannerConfig::default());
        let kit = QueryPlannerKit::default();
        let shortest = ShortestRelationshipPattern {
            name: Some(Var::new("p")),
            rel: PatternRelationship::new("r", "a", "b", SemanticDirection::Outgoing),
            single: true,
        };
        let qg = QueryGraph::empty()
            .add_pattern_nodes(["a", "b"])
            .add_shortest_relationships([shortest])
            .add_predicates([Expression::FunctionCall {
                name: "length".into(),
                args: vec![Expression::var("p")],
            }]);
        let args = BTreeSet::new();
        let a = ctx.producer().all_nodes_scan(&Var::new("a"), &args);
        let b = ctx.producer().all_nodes_scan(&Var::new("b"), &args);
        let cp = ctx.producer().cartesian_product(&a, &b);

        let plan = kit.select(cp, &qg, &ctx);
        assert_eq!(plan.op.name(), "Filter");
        assert_eq!(plan.lhs().map(|p| p.op.name()), Some("ShortestPath"));

        let again = kit.select(plan.clone(), &qg, &ctx);
        assert_eq!(again, plan);
    }
}

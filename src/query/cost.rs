//! Cost estimation and plan ranking.
//!
//! The planner treats costing as an external collaborator: it only ever asks a
//! [`PlanRanker`] to pick one plan out of a candidate list. The bundled
//! cardinality model only looks at node, label and relationship-type counts.

use crate::query::expr::{Expression, Predicate};
use crate::query::graph::{PatternLength, PatternRelationship};
use crate::query::logical::{ExpansionMode, LogicalOp, LogicalPlan};
use crate::query::metadata::{PlanningMetadata, StatisticsKey};

const EQUALITY_SELECTIVITY: f64 = 0.1;
const DEFAULT_SELECTIVITY: f64 = 0.5;
const MAX_ESTIMATED_HOPS: u32 = 5;

/// Row count and accumulated cost of a plan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    /// Estimated output rows.
    pub cardinality: f64,
    /// Estimated work to produce them.
    pub cost: f64,
}

/// Assigns a cost to a logical plan.
pub trait CostModel: Send + Sync {
    /// Estimates `plan` against the supplied statistics.
    fn estimate(&self, plan: &LogicalPlan, metadata: &dyn PlanningMetadata) -> Estimate;
}

/// Picks the best plan among competing candidates.
///
/// Implementations must be deterministic: the same candidates in the same
/// order always yield the same pick.
pub trait PlanRanker: Send + Sync {
    /// Position of the best candidate, `None` for an empty slice.
    fn best_index(
        &self,
        candidates: &[&LogicalPlan],
        metadata: &dyn PlanningMetadata,
    ) -> Option<usize>;

    /// Consumes `candidates` and returns the best one.
    fn select_best(
        &self,
        mut candidates: Vec<LogicalPlan>,
        metadata: &dyn PlanningMetadata,
    ) -> Option<LogicalPlan> {
        let idx = {
            let refs: Vec<&LogicalPlan> = candidates.iter().collect();
            self.best_index(&refs, metadata)?
        };
        (idx < candidates.len()).then(|| candidates.swap_remove(idx))
    }
}

/// Cost model driven by node and relationship counts.
#[derive(Clone, Copy, Debug, Default)]
pub struct CardinalityCostModel;

impl CardinalityCostModel {
    fn nodes(metadata: &dyn PlanningMetadata) -> f64 {
        metadata.value(&StatisticsKey::AllNodes).max(1.0)
    }

    fn degree(rel_types: &[String], metadata: &dyn PlanningMetadata) -> f64 {
        let rels = if rel_types.is_empty() {
            metadata.value(&StatisticsKey::RelationshipsWithType(None))
        } else {
            rel_types
                .iter()
                .map(|t| metadata.value(&StatisticsKey::RelationshipsWithType(Some(t.clone()))))
                .sum()
        };
        rels / Self::nodes(metadata)
    }

    fn selectivity(predicate: &Predicate, metadata: &dyn PlanningMetadata) -> f64 {
        if let Some((_, label)) = predicate.as_label_test() {
            let labelled = metadata.value(&StatisticsKey::NodesWithLabel(label.to_owned()));
            return (labelled / Self::nodes(metadata)).clamp(0.0, 1.0);
        }
        match &predicate.expr {
            Expression::Comparison { .. } if predicate.as_property_equality().is_some() => {
                EQUALITY_SELECTIVITY
            }
            _ => DEFAULT_SELECTIVITY,
        }
    }

    fn hops(min: u32, max: Option<u32>) -> i32 {
        let upper = max.unwrap_or(min.max(1) + 2);
        upper.clamp(1, MAX_ESTIMATED_HOPS) as i32
    }

    fn expansion(
        input: Estimate,
        degree: f64,
        hops: i32,
        mode: ExpansionMode,
        nodes: f64,
    ) -> Estimate {
        let fan_out = degree.max(f64::MIN_POSITIVE).powi(hops);
        let cardinality = match mode {
            ExpansionMode::ExpandAll => input.cardinality * fan_out,
            ExpansionMode::ExpandInto => input.cardinality * (fan_out / nodes).min(1.0),
        };
        Estimate {
            cardinality,
            cost: input.cost + input.cardinality * fan_out.max(1.0),
        }
    }

    fn estimate_relationship(
        &self,
        input: Estimate,
        rel: &PatternRelationship,
        mode: ExpansionMode,
        metadata: &dyn PlanningMetadata,
    ) -> Estimate {
        let hops = match rel.length {
            PatternLength::Simple => 1,
            PatternLength::VarLength { min, max } => Self::hops(min, max),
        };
        Self::expansion(
            input,
            Self::degree(&rel.types, metadata),
            hops,
            mode,
            Self::nodes(metadata),
        )
    }
}

impl CostModel for CardinalityCostModel {
    fn estimate(&self, plan: &LogicalPlan, metadata: &dyn PlanningMetadata) -> Estimate {
        let inputs: Vec<Estimate> = plan
            .inputs
            .iter()
            .map(|input| self.estimate(input, metadata))
            .collect();
        let first = inputs.first().copied().unwrap_or(Estimate {
            cardinality: 1.0,
            cost: 0.0,
        });
        let nodes = Self::nodes(metadata);
        match &plan.op {
            LogicalOp::Argument { .. } => Estimate {
                cardinality: 1.0,
                cost: 1.0,
            },
            LogicalOp::AllNodesScan { .. } => Estimate {
                cardinality: nodes,
                cost: nodes,
            },
            LogicalOp::NodeByLabelScan { label, .. } => {
                let rows = metadata.value(&StatisticsKey::NodesWithLabel(label.clone()));
                Estimate {
                    cardinality: rows,
                    cost: rows.max(1.0),
                }
            }
            LogicalOp::NodeIndexSeek { label, .. } => {
                let rows =
                    metadata.value(&StatisticsKey::NodesWithLabel(label.clone())) * EQUALITY_SELECTIVITY;
                Estimate {
                    cardinality: rows,
                    cost: rows.max(1.0),
                }
            }
            LogicalOp::DirectedRelationshipTypeScan { rel_type, .. } => {
                let rows = metadata.value(&StatisticsKey::RelationshipsWithType(Some(
                    rel_type.clone(),
                )));
                Estimate {
                    cardinality: rows,
                    cost: rows.max(1.0),
                }
            }
            LogicalOp::Expand { types, mode, .. } => {
                Self::expansion(first, Self::degree(types, metadata), 1, *mode, nodes)
            }
            LogicalOp::VarExpand {
                types,
                min,
                max,
                mode,
                ..
            } => Self::expansion(
                first,
                Self::degree(types, metadata),
                Self::hops(*min, *max),
                *mode,
                nodes,
            ),
            LogicalOp::Trail { pattern, mode, .. } => pattern.pattern_relationships.iter().fold(
                first,
                |acc, rel| {
                    let per_iteration = self.estimate_relationship(acc, rel, *mode, metadata);
                    let hops = Self::hops(pattern.repetition.min, pattern.repetition.max);
                    Estimate {
                        cardinality: per_iteration.cardinality * f64::from(hops),
                        cost: per_iteration.cost * f64::from(hops),
                    }
                },
            ),
            LogicalOp::StatefulShortestPath { .. } => Estimate {
                cardinality: first.cardinality,
                cost: first.cost + first.cardinality * nodes,
            },
            LogicalOp::ShortestPath { .. } => Estimate {
                cardinality: first.cardinality,
                cost: first.cost + first.cardinality * nodes.sqrt(),
            },
            LogicalOp::ProjectEndpoints { .. } => Estimate {
                cardinality: first.cardinality,
                cost: first.cost + first.cardinality,
            },
            LogicalOp::Selection { predicates } => {
                let selectivity: f64 = predicates
                    .iter()
                    .map(|p| Self::selectivity(p, metadata))
                    .product();
                Estimate {
                    cardinality: first.cardinality * selectivity,
                    cost: first.cost + first.cardinality * 0.1,
                }
            }
            LogicalOp::CartesianProduct | LogicalOp::Apply => {
                let rhs = inputs.get(1).copied().unwrap_or(first);
                Estimate {
                    cardinality: first.cardinality * rhs.cardinality,
                    cost: first.cost + first.cardinality.max(1.0) * rhs.cost,
                }
            }
            LogicalOp::NodeHashJoin { join_nodes } => {
                let rhs = inputs.get(1).copied().unwrap_or(first);
                let divisor = nodes.powi(join_nodes.len().max(1) as i32);
                Estimate {
                    cardinality: first.cardinality * rhs.cardinality / divisor,
                    cost: first.cost + rhs.cost + first.cardinality + rhs.cardinality,
                }
            }
            LogicalOp::Optional { .. } => Estimate {
                cardinality: first.cardinality.max(1.0),
                cost: first.cost,
            },
            LogicalOp::Sort { .. } => Estimate {
                cardinality: first.cardinality,
                cost: first.cost + first.cardinality * (first.cardinality + 1.0).log2(),
            },
        }
    }
}

/// Ranks by [`CostModel`] cost. The first of equally cheap candidates wins.
pub struct CostBasedRanker<M = CardinalityCostModel> {
    model: M,
}

impl<M: CostModel> CostBasedRanker<M> {
    /// Ranks with `model`.
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl Default for CostBasedRanker<CardinalityCostModel> {
    fn default() -> Self {
        Self::new(CardinalityCostModel)
    }
}

impl<M: CostModel> PlanRanker for CostBasedRanker<M> {
    fn best_index(
        &self,
        candidates: &[&LogicalPlan],
        metadata: &dyn PlanningMetadata,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, plan) in candidates.iter().enumerate() {
            let cost = self.model.estimate(plan, metadata).cost;
            match best {
                Some((_, best_cost)) if cost.total_cmp(&best_cost).is_ge() => {}
                _ => best = Some((idx, cost)),
            }
        }
        best.map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::query::expr::Var;
    use crate::query::metadata::InMemoryMetadata;
    use crate::query::producer::PlanProducer;

    #[test]
    fn label_scan_beats_all_nodes_for_rare_label() {
        let metadata = InMemoryMetadata::new()
            .with_nodes(1_000)
            .with_label("Person", 10);
        let producer = PlanProducer::new();
        let n = Var::new("n");
        let args = BTreeSet::new();
        let all = producer.all_nodes_scan(&n, &args);
        let by_label = producer.node_by_label_scan(
            &n,
            "Person",
            Predicate::new(Expression::has_label("n", "Person")),
            None,
            &args,
        );
        let ranker = CostBasedRanker::default();
        let best = ranker
            .select_best(vec![all, by_label.clone()], &metadata)
            .expect("one plan");
        assert_eq!(best, by_label);
    }

    #[test]
    fn ties_keep_first_candidate() {
        let metadata = InMemoryMetadata::new().with_nodes(10);
        let producer = PlanProducer::new();
        let args = BTreeSet::new();
        let a = producer.all_nodes_scan(&Var::new("a"), &args);
        let b = producer.all_nodes_scan(&Var::new("b"), &args);
        let ranker = CostBasedRanker::default();
        assert_eq!(ranker.best_index(&[&a, &b], &metadata), Some(0));
        assert_eq!(ranker.best_index(&[&b, &a], &metadata), Some(0));
        assert_eq!(ranker.best_index(&[], &metadata), None);
    }
}

//! Leaf plan enumeration.

use std::collections::BTreeSet;

use crate::query::context::PlanningContext;
use crate::query::expr::{Predicate, Var};
use crate::query::graph::{Hint, QueryGraph};
use crate::query::logical::LogicalPlan;
use crate::query::order::InterestingOrder;

/// Enumerates access paths ("leaves") for the nodes and relationships of a
/// query graph.
pub trait LeafPlanProvider: Send + Sync {
    /// Candidate leaves for `qg`. More than one leaf per node is expected;
    /// the planner ranks them.
    fn leaf_plans(
        &self,
        qg: &QueryGraph,
        order: &InterestingOrder,
        ctx: &PlanningContext,
    ) -> Vec<LogicalPlan>;
}

/// Argument leaves, all-nodes scans, label scans, index seeks and
/// relationship-type scans.
///
/// A `USING INDEX` or `USING SCAN` hint on a node restricts that node to the
/// hinted access path whenever the path can be built.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultLeafPlanner;

impl DefaultLeafPlanner {
    fn node_leaves(&self, qg: &QueryGraph, var: &Var, ctx: &PlanningContext) -> Vec<LogicalPlan> {
        let producer = ctx.producer();
        let args = &qg.argument_ids;
        let labels = qg.labels_on(var);

        let mut label_scans = Vec::new();
        for (predicate, label) in &labels {
            let hint = scan_hint(qg, var, label);
            label_scans.push((
                hint.is_some(),
                producer.node_by_label_scan(var, label, (*predicate).clone(), hint, args),
            ));
        }

        let mut seeks = Vec::new();
        for predicate in &qg.selections {
            let Some((seek_var, key, value)) = predicate.as_property_equality() else {
                continue;
            };
            if seek_var != var || !value.dependencies().is_subset(args) {
                continue;
            }
            for (label_predicate, label) in &labels {
                if !ctx.metadata().has_node_index(label, key) {
                    continue;
                }
                let hint = index_hint(qg, var, label, key);
                let solved: [Predicate; 2] = [predicate.clone(), (*label_predicate).clone()];
                seeks.push((
                    hint.is_some(),
                    producer.node_index_seek(var, label, key, value, solved, hint, args),
                ));
            }
        }

        let hinted: Vec<LogicalPlan> = seeks
            .iter()
            .chain(&label_scans)
            .filter(|(hinted, _)| *hinted)
            .map(|(_, plan)| plan.clone())
            .collect();
        if !hinted.is_empty() {
            return hinted;
        }

        let mut out = vec![producer.all_nodes_scan(var, args)];
        out.extend(label_scans.into_iter().map(|(_, plan)| plan));
        out.extend(seeks.into_iter().map(|(_, plan)| plan));
        out
    }
}

impl LeafPlanProvider for DefaultLeafPlanner {
    fn leaf_plans(
        &self,
        qg: &QueryGraph,
        _order: &InterestingOrder,
        ctx: &PlanningContext,
    ) -> Vec<LogicalPlan> {
        let args = &qg.argument_ids;
        let mut leaves = Vec::new();

        let bound_nodes: BTreeSet<Var> = qg.pattern_nodes.intersection(args).cloned().collect();
        if !args.is_empty() && (!bound_nodes.is_empty() || qg.pattern_nodes.is_empty()) {
            leaves.push(ctx.producer().argument(args, bound_nodes));
        }

        for var in qg.pattern_nodes.iter().filter(|n| !args.contains(*n)) {
            leaves.extend(self.node_leaves(qg, var, ctx));
        }

        for rel in &qg.pattern_relationships {
            if args.contains(&rel.name) || rel.left == rel.right {
                continue;
            }
            if let Some(scan) = ctx.producer().relationship_type_scan(rel, args) {
                leaves.push(scan);
            }
        }
        leaves
    }
}

fn scan_hint(qg: &QueryGraph, var: &Var, label: &str) -> Option<Hint> {
    qg.hints
        .iter()
        .find(|h| matches!(h, Hint::UsingScan { var: v, label: l } if v == var && l == label))
        .cloned()
}

fn index_hint(qg: &QueryGraph, var: &Var, label: &str, property: &str) -> Option<Hint> {
    qg.hints
        .iter()
        .find(|h| {
            matches!(h, Hint::UsingIndex { var: v, label: l, property: p }
                if v == var && l == label && p == property)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::context::{PlannerConfig, PlanningContext};
    use crate::query::expr::Expression;
    use crate::query::graph::{PatternRelationship, SemanticDirection};
    use crate::query::metadata::InMemoryMetadata;

    fn ctx(metadata: InMemoryMetadata) -> PlanningContext {
        PlanningContext::new(Arc::new(metadata), PlannerConfig::default())
    }

    fn op_names(plans: &[LogicalPlan]) -> Vec<&'static str> {
        plans.iter().map(|p| p.op.name()).collect()
    }

    #[test]
    fn node_gets_scan_label_scan_and_seek() {
        let ctx = ctx(InMemoryMetadata::new().with_node_index("Person", "name"));
        let qg = QueryGraph::empty()
            .add_pattern_nodes(["n"])
            .add_predicates([
                Expression::has_label("n", "Person"),
                Expression::equals(Expression::prop("n", "name"), Expression::lit("Ada")),
            ]);
        let leaves = DefaultLeafPlanner.leaf_plans(&qg, &InterestingOrder::empty(), &ctx);
        assert_eq!(
            op_names(&leaves),
            vec!["AllNodesScan", "NodeByLabelScan", "NodeIndexSeek"]
        );
        assert_eq!(leaves[2].solved.predicates.len(), 2);
    }

    #[test]
    fn scan_hint_restricts_leaves() {
        let ctx = ctx(InMemoryMetadata::new());
        let qg = QueryGraph::empty()
            .add_pattern_nodes(["n"])
            .add_predicates([Expression::has_label("n", "Person")])
            .add_hints([Hint::UsingScan {
                var: Var::new("n"),
                label: "Person".into(),
            }]);
        let leaves = DefaultLeafPlanner.leaf_plans(&qg, &InterestingOrder::empty(), &ctx);
        assert_eq!(op_names(&leaves), vec!["NodeByLabelScan"]);
        assert_eq!(leaves[0].solved.hints.len(), 1);
    }

    #[test]
    fn argument_nodes_get_argument_leaf() {
        let ctx = ctx(InMemoryMetadata::new());
        let qg = QueryGraph::empty()
            .add_pattern_relationship(
                PatternRelationship::new("r", "a", "b", SemanticDirection::Outgoing)
                    .with_types(["KNOWS"]),
            )
            .add_argument_ids(["a"]);
        let leaves = DefaultLeafPlanner.leaf_plans(&qg, &InterestingOrder::empty(), &ctx);
        assert_eq!(
            op_names(&leaves),
            vec!["Argument", "AllNodesScan", "DirectedRelationshipTypeScan"]
        );
        assert!(leaves[0].solved.nodes.contains(&Var::new("a")));
    }
}

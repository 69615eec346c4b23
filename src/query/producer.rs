//! Constructors for logical plan nodes.
//!
//! Every plan the planner builds goes through [`PlanProducer`], which keeps
//! `available_symbols`, `solved` and `provided_order` consistent with the
//! operator being created.

use std::collections::BTreeSet;

use crate::query::expr::{Expression, Predicate, Var};
use crate::query::graph::{
    Hint, NodeConnection, PatternLength, PatternRelationship, SemanticDirection,
    ShortestRelationshipPattern,
};
use crate::query::logical::{
    ExpansionMode, LogicalOp, LogicalPlan, PlanIdGen, PlanNode, Solved,
};
use crate::query::order::{ColumnOrder, ProvidedOrder};

/// Builds plan nodes with fresh identifiers.
#[derive(Debug, Default)]
pub struct PlanProducer {
    ids: PlanIdGen,
}

impl PlanProducer {
    /// New producer with its own identifier sequence.
    pub fn new() -> Self {
        Self::default()
    }

    fn build(
        &self,
        op: LogicalOp,
        inputs: Vec<LogicalPlan>,
        available_symbols: BTreeSet<Var>,
        solved: Solved,
        provided_order: ProvidedOrder,
    ) -> LogicalPlan {
        LogicalPlan::new(PlanNode {
            id: self.ids.next_id(),
            op,
            inputs,
            available_symbols,
            solved,
            provided_order,
        })
    }

    /// Leaf producing the argument row. `nodes` are the pattern nodes the
    /// arguments already bind.
    pub fn argument(&self, args: &BTreeSet<Var>, nodes: BTreeSet<Var>) -> LogicalPlan {
        let solved = Solved {
            nodes,
            ..Solved::default()
        };
        self.build(
            LogicalOp::Argument { vars: args.clone() },
            Vec::new(),
            args.clone(),
            solved,
            ProvidedOrder::empty(),
        )
    }

    /// Scan of every node.
    pub fn all_nodes_scan(&self, var: &Var, args: &BTreeSet<Var>) -> LogicalPlan {
        self.build(
            LogicalOp::AllNodesScan {
                var: var.clone(),
                arguments: args.clone(),
            },
            Vec::new(),
            with(args, [var]),
            solved_node(var),
            ProvidedOrder::empty(),
        )
    }

    /// Label scan solving the label predicate and an optional scan hint.
    pub fn node_by_label_scan(
        &self,
        var: &Var,
        label: &str,
        predicate: Predicate,
        hint: Option<Hint>,
        args: &BTreeSet<Var>,
    ) -> LogicalPlan {
        let mut solved = solved_node(var);
        solved.predicates.insert(predicate);
        solved.hints.extend(hint);
        self.build(
            LogicalOp::NodeByLabelScan {
                var: var.clone(),
                label: label.to_owned(),
                arguments: args.clone(),
            },
            Vec::new(),
            with(args, [var]),
            solved,
            ProvidedOrder::empty(),
        )
    }

    /// Index seek. The output is ordered ascending on the indexed property.
    #[allow(clippy::too_many_arguments)]
    pub fn node_index_seek(
        &self,
        var: &Var,
        label: &str,
        property: &str,
        value: &Expression,
        predicates: impl IntoIterator<Item = Predicate>,
        hint: Option<Hint>,
        args: &BTreeSet<Var>,
    ) -> LogicalPlan {
        let mut solved = solved_node(var);
        solved.predicates.extend(predicates);
        solved.hints.extend(hint);
        self.build(
            LogicalOp::NodeIndexSeek {
                var: var.clone(),
                label: label.to_owned(),
                property: property.to_owned(),
                value: value.clone(),
                arguments: args.clone(),
            },
            Vec::new(),
            with(args, [var]),
            solved,
            ProvidedOrder::new([ColumnOrder::asc(Expression::prop(var, property))]),
        )
    }

    /// Scan of all relationships of the single type of `rel`, binding both
    /// endpoints. Undirected and multi-typed relationships cannot be scanned.
    pub fn relationship_type_scan(
        &self,
        rel: &PatternRelationship,
        args: &BTreeSet<Var>,
    ) -> Option<LogicalPlan> {
        let rel_type = rel.single_type()?;
        if !rel.length.is_simple() {
            return None;
        }
        let (start, end) = match rel.direction {
            SemanticDirection::Outgoing => (&rel.left, &rel.right),
            SemanticDirection::Incoming => (&rel.right, &rel.left),
            SemanticDirection::Both => return None,
        };
        let solved = Solved {
            nodes: rel.boundary_nodes_set(),
            connections: BTreeSet::from([NodeConnection::Relationship(rel.clone())]),
            ..Solved::default()
        };
        Some(self.build(
            LogicalOp::DirectedRelationshipTypeScan {
                rel: rel.name.clone(),
                start: start.clone(),
                end: end.clone(),
                rel_type: rel_type.to_owned(),
                arguments: args.clone(),
            },
            Vec::new(),
            with(args, rel.covered_ids().iter()),
            solved,
            ProvidedOrder::empty(),
        ))
    }

    /// Expands `conn` from the bound node `from`.
    ///
    /// Returns `None` when `from` is not an endpoint of `conn`, when `from`
    /// is not bound by `source`, or when a plain relationship variable is
    /// already bound (that case is handled by [`Self::project_endpoints`]).
    pub fn expand(
        &self,
        source: &LogicalPlan,
        conn: &NodeConnection,
        from: &Var,
    ) -> Option<LogicalPlan> {
        if !source.available_symbols.contains(from) {
            return None;
        }
        let to = conn.other_side(from)?.clone();
        let mode = if source.available_symbols.contains(&to) {
            ExpansionMode::ExpandInto
        } else {
            ExpansionMode::ExpandAll
        };
        let op = match conn {
            NodeConnection::Relationship(rel) => {
                if source.available_symbols.contains(&rel.name) {
                    return None;
                }
                let direction = rel.direction_from(from);
                match rel.length {
                    PatternLength::Simple => LogicalOp::Expand {
                        from: from.clone(),
                        rel: rel.name.clone(),
                        to,
                        direction,
                        types: rel.types.clone(),
                        mode,
                    },
                    PatternLength::VarLength { min, max } => LogicalOp::VarExpand {
                        from: from.clone(),
                        rel: rel.name.clone(),
                        to,
                        direction,
                        types: rel.types.clone(),
                        min,
                        max,
                        mode,
                    },
                }
            }
            NodeConnection::Quantified(qpp) => LogicalOp::Trail {
                pattern: qpp.clone(),
                from: from.clone(),
                to,
                mode,
            },
            NodeConnection::Selective(spp) => LogicalOp::StatefulShortestPath {
                pattern: spp.clone(),
                from: from.clone(),
                to,
                mode,
            },
        };
        let mut solved = source.solved.clone();
        solved.nodes.extend(conn.boundary_nodes_set());
        solved.connections.insert(conn.clone());
        let available = with(&source.available_symbols, conn.covered_ids().iter());
        let order = source.provided_order.clone();
        Some(self.build(op, vec![source.clone()], available, solved, order))
    }

    /// Binds the endpoints of a relationship whose variable `source` already
    /// provides.
    pub fn project_endpoints(
        &self,
        source: &LogicalPlan,
        rel: &PatternRelationship,
    ) -> LogicalPlan {
        let mut solved = source.solved.clone();
        solved.nodes.extend(rel.boundary_nodes_set());
        solved
            .connections
            .insert(NodeConnection::Relationship(rel.clone()));
        let op = LogicalOp::ProjectEndpoints {
            rel: rel.name.clone(),
            start: rel.left.clone(),
            start_in_scope: source.available_symbols.contains(&rel.left),
            end: rel.right.clone(),
            end_in_scope: source.available_symbols.contains(&rel.right),
            direction: rel.direction,
        };
        let available = with(&source.available_symbols, rel.covered_ids().iter());
        let order = source.provided_order.clone();
        self.build(op, vec![source.clone()], available, solved, order)
    }

    /// Legacy shortest path between two nodes `source` already binds.
    pub fn shortest_path(
        &self,
        source: &LogicalPlan,
        pattern: &ShortestRelationshipPattern,
    ) -> LogicalPlan {
        let mut solved = source.solved.clone();
        solved.shortest.insert(pattern.clone());
        let available = with(&source.available_symbols, pattern.names().iter());
        let order = source.provided_order.clone();
        self.build(
            LogicalOp::ShortestPath {
                pattern: pattern.clone(),
            },
            vec![source.clone()],
            available,
            solved,
            order,
        )
    }

    /// Filter. Returns `source` unchanged when there is nothing to apply.
    pub fn selection(&self, source: &LogicalPlan, predicates: BTreeSet<Predicate>) -> LogicalPlan {
        if predicates.is_empty() {
            return source.clone();
        }
        let mut solved = source.solved.clone();
        solved.predicates.extend(predicates.iter().cloned());
        let available = source.available_symbols.clone();
        let order = source.provided_order.clone();
        self.build(
            LogicalOp::Selection { predicates },
            vec![source.clone()],
            available,
            solved,
            order,
        )
    }

    /// Cross product. Keeps the left order, refined by the right order.
    pub fn cartesian_product(&self, lhs: &LogicalPlan, rhs: &LogicalPlan) -> LogicalPlan {
        let order = if lhs.provided_order.is_empty() {
            ProvidedOrder::empty()
        } else {
            ProvidedOrder::new(
                lhs.provided_order
                    .columns()
                    .iter()
                    .chain(rhs.provided_order.columns())
                    .cloned(),
            )
        };
        self.build(
            LogicalOp::CartesianProduct,
            vec![lhs.clone(), rhs.clone()],
            union(&lhs.available_symbols, &rhs.available_symbols),
            lhs.solved.merge(&rhs.solved),
            order,
        )
    }

    /// Hash join on `join_nodes`. The probe side (`rhs`) order survives.
    /// A `USING JOIN` hint on exactly these nodes is marked solved.
    pub fn node_hash_join(
        &self,
        join_nodes: BTreeSet<Var>,
        lhs: &LogicalPlan,
        rhs: &LogicalPlan,
        hints: &BTreeSet<Hint>,
    ) -> LogicalPlan {
        let mut solved = lhs.solved.merge(&rhs.solved);
        solved.hints.extend(
            hints
                .iter()
                .filter(|h| matches!(h, Hint::UsingJoin { vars } if vars == &join_nodes))
                .cloned(),
        );
        let order = rhs.provided_order.clone();
        self.build(
            LogicalOp::NodeHashJoin { join_nodes },
            vec![lhs.clone(), rhs.clone()],
            union(&lhs.available_symbols, &rhs.available_symbols),
            solved,
            order,
        )
    }

    /// Runs `rhs` once per `lhs` row.
    pub fn apply(&self, lhs: &LogicalPlan, rhs: &LogicalPlan) -> LogicalPlan {
        let order = lhs.provided_order.clone();
        self.build(
            LogicalOp::Apply,
            vec![lhs.clone(), rhs.clone()],
            union(&lhs.available_symbols, &rhs.available_symbols),
            lhs.solved.merge(&rhs.solved),
            order,
        )
    }

    /// Null-pads `source` when it produces no rows.
    pub fn optional(&self, source: &LogicalPlan, args: &BTreeSet<Var>) -> LogicalPlan {
        let order = source.provided_order.clone();
        self.build(
            LogicalOp::Optional {
                arguments: args.clone(),
            },
            vec![source.clone()],
            source.available_symbols.clone(),
            source.solved.clone(),
            order,
        )
    }

    /// Full sort on `columns`.
    pub fn sort(&self, source: &LogicalPlan, columns: Vec<ColumnOrder>) -> LogicalPlan {
        let order = ProvidedOrder::new(columns.iter().cloned());
        self.build(
            LogicalOp::Sort { columns },
            vec![source.clone()],
            source.available_symbols.clone(),
            source.solved.clone(),
            order,
        )
    }
}

fn solved_node(var: &Var) -> Solved {
    Solved {
        nodes: BTreeSet::from([var.clone()]),
        ..Solved::default()
    }
}

fn with<'a>(base: &BTreeSet<Var>, extra: impl IntoIterator<Item = &'a Var>) -> BTreeSet<Var> {
    let mut out = base.clone();
    out.extend(extra.into_iter().cloned());
    out
}

fn union(left: &BTreeSet<Var>, right: &BTreeSet<Var>) -> BTreeSet<Var> {
    left.union(right).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::graph::{PatternLength, PatternRelationship, SemanticDirection};

    fn no_args() -> BTreeSet<Var> {
        BTreeSet::new()
    }

    #[test]
    fn expand_switches_to_into_when_target_bound() {
        let producer = PlanProducer::new();
        let a = producer.all_nodes_scan(&Var::new("a"), &no_args());
        let b = producer.all_nodes_scan(&Var::new("b"), &no_args());
        let rel = NodeConnection::Relationship(PatternRelationship::new(
            "r",
            "a",
            "b",
            SemanticDirection::Outgoing,
        ));

        let all = producer.expand(&a, &rel, &Var::new("a")).expect("expand");
        assert_eq!(all.op.name(), "Expand(All)");
        assert!(all.available_symbols.contains(&Var::new("r")));

        let cp = producer.cartesian_product(&a, &b);
        let into = producer.expand(&cp, &rel, &Var::new("b")).expect("expand");
        assert_eq!(into.op.name(), "Expand(Into)");
        match &into.op {
            LogicalOp::Expand { direction, .. } => {
                assert_eq!(*direction, SemanticDirection::Incoming)
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(producer.expand(&a, &rel, &Var::new("b")).is_none());
    }

    #[test]
    fn var_length_relationship_becomes_var_expand() {
        let producer = PlanProducer::new();
        let a = producer.all_nodes_scan(&Var::new("a"), &no_args());
        let rel = PatternRelationship::new("r", "a", "b", SemanticDirection::Outgoing)
            .with_length(PatternLength::VarLength { min: 1, max: None });
        let plan = producer
            .expand(&a, &NodeConnection::Relationship(rel), &Var::new("a"))
            .expect("expand");
        assert_eq!(plan.op.name(), "VarLengthExpand");
    }

    #[test]
    fn index_seek_provides_order_and_sort_replaces_it() {
        let producer = PlanProducer::new();
        let seek = producer.node_index_seek(
            &Var::new("n"),
            "Person",
            "name",
            &Expression::lit("Ada"),
            [],
            None,
            &no_args(),
        );
        assert_eq!(
            seek.provided_order.columns(),
            &[ColumnOrder::asc(Expression::prop("n", "name"))]
        );
        let sorted = producer.sort(&seek, vec![ColumnOrder::desc(Expression::var("n"))]);
        assert_eq!(
            sorted.provided_order.columns(),
            &[ColumnOrder::desc(Expression::var("n"))]
        );
    }

    #[test]
    fn relationship_type_scan_needs_single_directed_type() {
        let producer = PlanProducer::new();
        let typed = PatternRelationship::new("r", "a", "b", SemanticDirection::Incoming)
            .with_types(["KNOWS"]);
        let plan = producer
            .relationship_type_scan(&typed, &no_args())
            .expect("scan");
        match &plan.op {
            LogicalOp::DirectedRelationshipTypeScan { start, end, .. } => {
                assert_eq!(start.as_str(), "b");
                assert_eq!(end.as_str(), "a");
            }
            other => panic!("unexpected op {other:?}"),
        }
        let untyped = PatternRelationship::new("r", "a", "b", SemanticDirection::Outgoing);
        assert!(producer.relationship_type_scan(&untyped, &no_args()).is_none());
    }
}

//! Logical query plan structures produced by the planner.
//!
//! Plans are immutable trees shared through [`Arc`], so the join enumerator can
//! keep many partial plans that reuse common sub-trees. Every node records the
//! symbols it makes available, the part of the query graph it solved and the
//! order it guarantees on its output.

use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::query::expr::{Expression, Predicate, Var};
use crate::query::graph::{
    Hint, NodeConnection, QuantifiedPathPattern, SelectivePathPattern, SemanticDirection,
    ShortestRelationshipPattern,
};
use crate::query::order::{ColumnOrder, ProvidedOrder};

/// Identifier of a plan node, unique within one planning run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PlanId(pub u64);

/// Monotonic [`PlanId`] source.
#[derive(Debug, Default)]
pub struct PlanIdGen {
    next: AtomicU64,
}

impl PlanIdGen {
    /// Starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next identifier.
    pub fn next_id(&self) -> PlanId {
        PlanId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Part of the query graph a plan has solved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Solved {
    /// Pattern nodes matched.
    pub nodes: BTreeSet<Var>,
    /// Node connections matched.
    pub connections: BTreeSet<NodeConnection>,
    /// Predicates applied.
    pub predicates: BTreeSet<Predicate>,
    /// Hints honoured.
    pub hints: BTreeSet<Hint>,
    /// Shortest-path patterns applied.
    pub shortest: BTreeSet<ShortestRelationshipPattern>,
}

impl Solved {
    /// Union of two summaries.
    pub fn merge(&self, other: &Solved) -> Solved {
        let mut out = self.clone();
        out.nodes.extend(other.nodes.iter().cloned());
        out.connections.extend(other.connections.iter().cloned());
        out.predicates.extend(other.predicates.iter().cloned());
        out.hints.extend(other.hints.iter().cloned());
        out.shortest.extend(other.shortest.iter().cloned());
        out
    }
}

/// Whether an expansion binds its target or checks an already-bound target.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ExpansionMode {
    /// Target node is newly bound.
    ExpandAll,
    /// Target node is already bound; only connecting relationships are kept.
    ExpandInto,
}

/// Logical operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    /// Produces one row holding the argument identifiers.
    Argument {
        /// Argument identifiers.
        vars: BTreeSet<Var>,
    },
    /// Scans every node.
    AllNodesScan {
        /// Bound node.
        var: Var,
        /// Argument identifiers passed through.
        arguments: BTreeSet<Var>,
    },
    /// Scans nodes carrying a label.
    NodeByLabelScan {
        /// Bound node.
        var: Var,
        /// Scanned label.
        label: String,
        /// Argument identifiers passed through.
        arguments: BTreeSet<Var>,
    },
    /// Seeks nodes through a property index. Output is ordered by the property.
    NodeIndexSeek {
        /// Bound node.
        var: Var,
        /// Indexed label.
        label: String,
        /// Indexed property.
        property: String,
        /// Sought value.
        value: Expression,
        /// Argument identifiers passed through.
        arguments: BTreeSet<Var>,
    },
    /// Scans relationships of one type, binding both endpoints.
    DirectedRelationshipTypeScan {
        /// Bound relationship.
        rel: Var,
        /// Source node.
        start: Var,
        /// Target node.
        end: Var,
        /// Scanned type.
        rel_type: String,
        /// Argument identifiers passed through.
        arguments: BTreeSet<Var>,
    },
    /// Single-hop expansion.
    Expand {
        /// Bound source node.
        from: Var,
        /// Relationship variable.
        rel: Var,
        /// Target node.
        to: Var,
        /// Direction from `from`.
        direction: SemanticDirection,
        /// Admissible types.
        types: Vec<String>,
        /// Expansion mode.
        mode: ExpansionMode,
    },
    /// Variable-length expansion.
    VarExpand {
        /// Bound source node.
        from: Var,
        /// Relationship list variable.
        rel: Var,
        /// Target node.
        to: Var,
        /// Direction from `from`.
        direction: SemanticDirection,
        /// Admissible types.
        types: Vec<String>,
        /// Minimum hops.
        min: u32,
        /// Maximum hops.
        max: Option<u32>,
        /// Expansion mode.
        mode: ExpansionMode,
    },
    /// Binds the endpoints of an already-bound relationship.
    ProjectEndpoints {
        /// Bound relationship.
        rel: Var,
        /// Left endpoint.
        start: Var,
        /// Whether `start` was already bound.
        start_in_scope: bool,
        /// Right endpoint.
        end: Var,
        /// Whether `end` was already bound.
        end_in_scope: bool,
        /// Direction relative to `start`.
        direction: SemanticDirection,
    },
    /// Repeated expansion of a quantified path pattern.
    Trail {
        /// Solved pattern.
        pattern: QuantifiedPathPattern,
        /// Bound boundary node the trail starts from.
        from: Var,
        /// Other boundary node.
        to: Var,
        /// Expansion mode for `to`.
        mode: ExpansionMode,
    },
    /// Path selection over a selective path pattern.
    StatefulShortestPath {
        /// Solved pattern.
        pattern: SelectivePathPattern,
        /// Bound boundary node the search starts from.
        from: Var,
        /// Other boundary node.
        to: Var,
        /// Expansion mode for `to`.
        mode: ExpansionMode,
    },
    /// Legacy shortest path between two bound nodes.
    ShortestPath {
        /// Solved pattern.
        pattern: ShortestRelationshipPattern,
    },
    /// Filters rows.
    Selection {
        /// Applied predicates.
        predicates: BTreeSet<Predicate>,
    },
    /// Cross product of two inputs.
    CartesianProduct,
    /// Hash join on node identity.
    NodeHashJoin {
        /// Join nodes.
        join_nodes: BTreeSet<Var>,
    },
    /// Runs the right input once per left row.
    Apply,
    /// Produces a null row when the input is empty.
    Optional {
        /// Identifiers kept when padding with nulls.
        arguments: BTreeSet<Var>,
    },
    /// Full sort.
    Sort {
        /// Sort items.
        columns: Vec<ColumnOrder>,
    },
}

impl LogicalOp {
    /// Operator name used in explain output.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOp::Argument { .. } => "Argument",
            LogicalOp::AllNodesScan { .. } => "AllNodesScan",
            LogicalOp::NodeByLabelScan { .. } => "NodeByLabelScan",
            LogicalOp::NodeIndexSeek { .. } => "NodeIndexSeek",
            LogicalOp::DirectedRelationshipTypeScan { .. } => "DirectedRelationshipTypeScan",
            LogicalOp::Expand {
                mode: ExpansionMode::ExpandAll,
                ..
            } => "Expand(All)",
            LogicalOp::Expand {
                mode: ExpansionMode::ExpandInto,
                ..
            } => "Expand(Into)",
            LogicalOp::VarExpand { .. } => "VarLengthExpand",
            LogicalOp::ProjectEndpoints { .. } => "ProjectEndpoints",
            LogicalOp::Trail { .. } => "Trail",
            LogicalOp::StatefulShortestPath { .. } => "StatefulShortestPath",
            LogicalOp::ShortestPath { .. } => "ShortestPath",
            LogicalOp::Selection { .. } => "Filter",
            LogicalOp::CartesianProduct => "CartesianProduct",
            LogicalOp::NodeHashJoin { .. } => "NodeHashJoin",
            LogicalOp::Apply => "Apply",
            LogicalOp::Optional { .. } => "Optional",
            LogicalOp::Sort { .. } => "Sort",
        }
    }
}

/// Node within the logical plan tree.
#[derive(Debug, PartialEq, Eq)]
pub struct PlanNode {
    /// Identifier within the planning run.
    pub id: PlanId,
    /// The logical operator at this node.
    pub op: LogicalOp,
    /// Child plans providing input to this operator.
    pub inputs: Vec<LogicalPlan>,
    /// Identifiers bound on every output row.
    pub available_symbols: BTreeSet<Var>,
    /// What the subtree rooted here solved.
    pub solved: Solved,
    /// Order guaranteed on the output.
    pub provided_order: ProvidedOrder,
}

/// Shared handle to an immutable plan tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalPlan(Arc<PlanNode>);

impl LogicalPlan {
    /// Wraps a node.
    pub fn new(node: PlanNode) -> Self {
        Self(Arc::new(node))
    }

    /// First input.
    pub fn lhs(&self) -> Option<&LogicalPlan> {
        self.inputs.first()
    }

    /// Second input.
    pub fn rhs(&self) -> Option<&LogicalPlan> {
        self.inputs.get(1)
    }

    /// True when the node has no inputs.
    pub fn is_leaf(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Visits every node, parents before children, left to right.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a LogicalPlan)) {
        visit(self);
        for input in &self.inputs {
            input.walk(visit);
        }
    }

    /// Number of nodes whose operator has the given explain name.
    pub fn count_ops(&self, name: &str) -> usize {
        let mut count = 0;
        self.walk(&mut |plan| {
            if plan.op.name() == name {
                count += 1;
            }
        });
        count
    }
}

impl Deref for LogicalPlan {
    type Target = PlanNode;

    fn deref(&self) -> &PlanNode {
        &self.0
    }
}

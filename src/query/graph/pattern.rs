//! Node connections: everything that links two pattern nodes.

use std::collections::BTreeSet;
use std::fmt;

use crate::query::expr::{Predicate, Var};

/// Traversal direction relative to the left node of a pattern.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SemanticDirection {
    /// `(left)-[]->(right)`
    #[default]
    Outgoing,
    /// `(left)<-[]-(right)`
    Incoming,
    /// `(left)-[]-(right)`
    Both,
}

impl SemanticDirection {
    /// Direction seen from the other endpoint.
    pub fn reversed(self) -> Self {
        match self {
            SemanticDirection::Outgoing => SemanticDirection::Incoming,
            SemanticDirection::Incoming => SemanticDirection::Outgoing,
            SemanticDirection::Both => SemanticDirection::Both,
        }
    }
}

/// Fixed or variable relationship length.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PatternLength {
    /// Exactly one hop.
    #[default]
    Simple,
    /// `*min..max`
    VarLength {
        /// Minimum number of hops.
        min: u32,
        /// Maximum number of hops, unbounded when `None`.
        max: Option<u32>,
    },
}

impl PatternLength {
    /// True for single-hop patterns.
    pub fn is_simple(&self) -> bool {
        matches!(self, PatternLength::Simple)
    }
}

/// `(left)-[name:TYPES*length]->(right)`
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PatternRelationship {
    /// Relationship variable.
    pub name: Var,
    /// Left endpoint.
    pub left: Var,
    /// Right endpoint.
    pub right: Var,
    /// Direction relative to `left`.
    pub direction: SemanticDirection,
    /// Admissible relationship types; empty means any.
    pub types: Vec<String>,
    /// Hop count.
    pub length: PatternLength,
}

impl PatternRelationship {
    /// Single-hop relationship of any type.
    pub fn new(
        name: impl Into<Var>,
        left: impl Into<Var>,
        right: impl Into<Var>,
        direction: SemanticDirection,
    ) -> Self {
        Self {
            name: name.into(),
            left: left.into(),
            right: right.into(),
            direction,
            types: Vec::new(),
            length: PatternLength::Simple,
        }
    }

    /// Restricts admissible types.
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the hop count.
    pub fn with_length(mut self, length: PatternLength) -> Self {
        self.length = length;
        self
    }

    /// Both endpoints.
    pub fn boundary_nodes_set(&self) -> BTreeSet<Var> {
        BTreeSet::from([self.left.clone(), self.right.clone()])
    }

    /// Endpoints plus the relationship variable.
    pub fn covered_ids(&self) -> BTreeSet<Var> {
        BTreeSet::from([self.left.clone(), self.right.clone(), self.name.clone()])
    }

    /// Returns the endpoint opposite to `node`.
    pub fn other_side(&self, node: &Var) -> Option<&Var> {
        if node == &self.left {
            Some(&self.right)
        } else if node == &self.right {
            Some(&self.left)
        } else {
            None
        }
    }

    /// Direction when traversing from `node`.
    pub fn direction_from(&self, node: &Var) -> SemanticDirection {
        if node == &self.left {
            self.direction
        } else {
            self.direction.reversed()
        }
    }

    /// Single type name, when exactly one type is admissible.
    pub fn single_type(&self) -> Option<&str> {
        match self.types.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for PatternRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = match self.direction {
            SemanticDirection::Outgoing => ("-", "->"),
            SemanticDirection::Incoming => ("<-", "-"),
            SemanticDirection::Both => ("-", "-"),
        };
        write!(f, "({}){open}[{}", self.left, self.name)?;
        if !self.types.is_empty() {
            write!(f, ":{}", self.types.join("|"))?;
        }
        if let PatternLength::VarLength { min, max } = self.length {
            match max {
                Some(max) => write!(f, "*{min}..{max}")?,
                None => write!(f, "*{min}..")?,
            }
        }
        write!(f, "]{close}({})", self.right)
    }
}

/// Repetition bounds of a quantified path pattern.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Repetition {
    /// Minimum repetitions.
    pub min: u32,
    /// Maximum repetitions, unbounded when `None`.
    pub max: Option<u32>,
}

/// Links a variable inside a quantified pattern to its group variable outside.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VariableGrouping {
    /// Variable bound per iteration.
    pub singleton: Var,
    /// List variable visible after the pattern.
    pub group: Var,
}

/// Boundary node of a quantified path pattern.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeBinding {
    /// Variable used inside the repeated pattern.
    pub inner: Var,
    /// Variable used by the enclosing query graph.
    pub outer: Var,
}

/// `(a) ((n)-[r]->(m)){min,max} (b)`
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct QuantifiedPathPattern {
    /// Left boundary.
    pub left_binding: NodeBinding,
    /// Right boundary.
    pub right_binding: NodeBinding,
    /// Relationships of one iteration.
    pub pattern_relationships: Vec<PatternRelationship>,
    /// Nodes of one iteration.
    pub pattern_nodes: BTreeSet<Var>,
    /// Per-iteration predicates.
    pub selections: BTreeSet<Predicate>,
    /// Repetition bounds.
    pub repetition: Repetition,
    /// Node group variables.
    pub node_variable_groupings: BTreeSet<VariableGrouping>,
    /// Relationship group variables.
    pub relationship_variable_groupings: BTreeSet<VariableGrouping>,
}

impl QuantifiedPathPattern {
    /// Outer boundary variables.
    pub fn boundary_nodes_set(&self) -> BTreeSet<Var> {
        BTreeSet::from([
            self.left_binding.outer.clone(),
            self.right_binding.outer.clone(),
        ])
    }

    /// Boundary variables plus every group variable.
    pub fn covered_ids(&self) -> BTreeSet<Var> {
        let mut ids = self.boundary_nodes_set();
        ids.extend(self.node_variable_groupings.iter().map(|g| g.group.clone()));
        ids.extend(self.relationship_ids());
        ids
    }

    /// Relationship group variables.
    pub fn relationship_ids(&self) -> BTreeSet<Var> {
        self.relationship_variable_groupings
            .iter()
            .map(|g| g.group.clone())
            .collect()
    }

    /// Variables the per-iteration predicates read from outside the pattern.
    pub fn dependencies(&self) -> BTreeSet<Var> {
        let inner: BTreeSet<Var> = self
            .pattern_nodes
            .iter()
            .cloned()
            .chain(self.pattern_relationships.iter().map(|r| r.name.clone()))
            .collect();
        self.selections
            .iter()
            .flat_map(|p| p.dependencies.iter())
            .filter(|v| !inner.contains(*v))
            .cloned()
            .collect()
    }
}

impl fmt::Display for QuantifiedPathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) (", self.left_binding.outer)?;
        for (idx, rel) in self.pattern_relationships.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{rel}")?;
        }
        match self.repetition.max {
            Some(max) => write!(f, "){{{},{}}}", self.repetition.min, max)?,
            None => write!(f, "){{{},}}", self.repetition.min)?,
        }
        write!(f, " ({})", self.right_binding.outer)
    }
}

/// Connection kinds allowed inside a selective path pattern.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ExhaustiveNodeConnection {
    /// Plain relationship.
    Relationship(PatternRelationship),
    /// Quantified sub-path.
    Quantified(QuantifiedPathPattern),
}

impl ExhaustiveNodeConnection {
    fn left(&self) -> &Var {
        match self {
            ExhaustiveNodeConnection::Relationship(rel) => &rel.left,
            ExhaustiveNodeConnection::Quantified(qpp) => &qpp.left_binding.outer,
        }
    }

    fn right(&self) -> &Var {
        match self {
            ExhaustiveNodeConnection::Relationship(rel) => &rel.right,
            ExhaustiveNodeConnection::Quantified(qpp) => &qpp.right_binding.outer,
        }
    }

    fn covered_ids(&self) -> BTreeSet<Var> {
        match self {
            ExhaustiveNodeConnection::Relationship(rel) => rel.covered_ids(),
            ExhaustiveNodeConnection::Quantified(qpp) => qpp.covered_ids(),
        }
    }

    fn relationship_ids(&self) -> BTreeSet<Var> {
        match self {
            ExhaustiveNodeConnection::Relationship(rel) => BTreeSet::from([rel.name.clone()]),
            ExhaustiveNodeConnection::Quantified(qpp) => qpp.relationship_ids(),
        }
    }
}

impl fmt::Display for ExhaustiveNodeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustiveNodeConnection::Relationship(rel) => write!(f, "{rel}"),
            ExhaustiveNodeConnection::Quantified(qpp) => write!(f, "{qpp}"),
        }
    }
}

/// Path selector of a selective path pattern.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PathSelector {
    /// `ANY k`
    Any(u32),
    /// `SHORTEST k`
    Shortest(u32),
    /// `ALL SHORTEST`
    AllShortest,
    /// `SHORTEST k GROUPS`
    ShortestGroups(u32),
}

impl fmt::Display for PathSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSelector::Any(k) => write!(f, "ANY {k}"),
            PathSelector::Shortest(k) => write!(f, "SHORTEST {k}"),
            PathSelector::AllShortest => f.write_str("ALL SHORTEST"),
            PathSelector::ShortestGroups(k) => write!(f, "SHORTEST {k} GROUPS"),
        }
    }
}

/// `SHORTEST 1 (a)-[r]->(b) ((x)-[s]->(y))* (c)`
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SelectivePathPattern {
    /// Connections ordered from the left boundary to the right boundary.
    pub path: Vec<ExhaustiveNodeConnection>,
    /// Predicates evaluated during path selection.
    pub selections: BTreeSet<Predicate>,
    /// Selector.
    pub selector: PathSelector,
}

impl SelectivePathPattern {
    /// Left-most and right-most nodes of the path.
    pub fn boundary_nodes_set(&self) -> BTreeSet<Var> {
        let mut out = BTreeSet::new();
        if let Some(first) = self.path.first() {
            out.insert(first.left().clone());
        }
        if let Some(last) = self.path.last() {
            out.insert(last.right().clone());
        }
        out
    }

    /// Every identifier bound along the path.
    pub fn covered_ids(&self) -> BTreeSet<Var> {
        self.path.iter().flat_map(|c| c.covered_ids()).collect()
    }

    /// Every relationship variable bound along the path.
    pub fn relationship_ids(&self) -> BTreeSet<Var> {
        self.path.iter().flat_map(|c| c.relationship_ids()).collect()
    }

    fn left(&self) -> Option<&Var> {
        self.path.first().map(|c| c.left())
    }

    fn right(&self) -> Option<&Var> {
        self.path.last().map(|c| c.right())
    }
}

impl fmt::Display for SelectivePathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.selector)?;
        for (idx, conn) in self.path.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{conn}")?;
        }
        Ok(())
    }
}

/// Anything that connects two pattern nodes and therefore has to be solved
/// by the join enumerator.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NodeConnection {
    /// Plain or var-length relationship.
    Relationship(PatternRelationship),
    /// Quantified path pattern.
    Quantified(QuantifiedPathPattern),
    /// Selective path pattern.
    Selective(SelectivePathPattern),
}

impl NodeConnection {
    /// Left boundary node.
    pub fn left(&self) -> Option<&Var> {
        match self {
            NodeConnection::Relationship(rel) => Some(&rel.left),
            NodeConnection::Quantified(qpp) => Some(&qpp.left_binding.outer),
            NodeConnection::Selective(spp) => spp.left(),
        }
    }

    /// Right boundary node.
    pub fn right(&self) -> Option<&Var> {
        match self {
            NodeConnection::Relationship(rel) => Some(&rel.right),
            NodeConnection::Quantified(qpp) => Some(&qpp.right_binding.outer),
            NodeConnection::Selective(spp) => spp.right(),
        }
    }

    /// The two endpoints.
    pub fn boundary_nodes_set(&self) -> BTreeSet<Var> {
        match self {
            NodeConnection::Relationship(rel) => rel.boundary_nodes_set(),
            NodeConnection::Quantified(qpp) => qpp.boundary_nodes_set(),
            NodeConnection::Selective(spp) => spp.boundary_nodes_set(),
        }
    }

    /// Every identifier the connection binds.
    pub fn covered_ids(&self) -> BTreeSet<Var> {
        match self {
            NodeConnection::Relationship(rel) => rel.covered_ids(),
            NodeConnection::Quantified(qpp) => qpp.covered_ids(),
            NodeConnection::Selective(spp) => spp.covered_ids(),
        }
    }

    /// Relationship variables bound by the connection.
    pub fn relationship_ids(&self) -> BTreeSet<Var> {
        match self {
            NodeConnection::Relationship(rel) => BTreeSet::from([rel.name.clone()]),
            NodeConnection::Quantified(qpp) => qpp.relationship_ids(),
            NodeConnection::Selective(spp) => spp.relationship_ids(),
        }
    }

    /// Endpoint opposite to `node`.
    pub fn other_side(&self, node: &Var) -> Option<&Var> {
        match (self.left(), self.right()) {
            (Some(left), Some(right)) if left == node => Some(right),
            (Some(left), Some(right)) if right == node => Some(left),
            _ => None,
        }
    }

    /// Outside variables read by predicates embedded in the connection.
    pub fn dependencies(&self) -> BTreeSet<Var> {
        match self {
            NodeConnection::Relationship(_) => BTreeSet::new(),
            NodeConnection::Quantified(qpp) => qpp.dependencies(),
            NodeConnection::Selective(spp) => {
                let covered = spp.covered_ids();
                spp.selections
                    .iter()
                    .flat_map(|p| p.dependencies.iter())
                    .filter(|v| !covered.contains(*v))
                    .cloned()
                    .collect()
            }
        }
    }
}

impl fmt::Display for NodeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeConnection::Relationship(rel) => write!(f, "{rel}"),
            NodeConnection::Quantified(qpp) => write!(f, "{qpp}"),
            NodeConnection::Selective(spp) => write!(f, "{spp}"),
        }
    }
}

impl From<PatternRelationship> for NodeConnection {
    fn from(rel: PatternRelationship) -> Self {
        NodeConnection::Relationship(rel)
    }
}

/// Legacy `shortestPath((a)-[r*]->(b))` pattern, solved once both endpoints
/// are bound.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ShortestRelationshipPattern {
    /// Optional path variable.
    pub name: Option<Var>,
    /// Relationship being searched.
    pub rel: PatternRelationship,
    /// `shortestPath` (true) or `allShortestPaths` (false).
    pub single: bool,
}

impl ShortestRelationshipPattern {
    /// Path variable and relationship variable.
    pub fn names(&self) -> BTreeSet<Var> {
        let mut out = BTreeSet::from([self.rel.name.clone()]);
        out.extend(self.name.clone());
        out
    }
}

impl fmt::Display for ShortestRelationshipPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = if self.single {
            "shortestPath"
        } else {
            "allShortestPaths"
        };
        match &self.name {
            Some(name) => write!(f, "{name} = {func}({})", self.rel),
            None => write!(f, "{func}({})", self.rel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_rendering() {
        let rel = PatternRelationship::new("r", "a", "b", SemanticDirection::Incoming)
            .with_types(["KNOWS", "LIKES"])
            .with_length(PatternLength::VarLength {
                min: 1,
                max: Some(3),
            });
        assert_eq!(rel.to_string(), "(a)<-[r:KNOWS|LIKES*1..3]-(b)");
        assert_eq!(rel.direction_from(&Var::new("b")), SemanticDirection::Outgoing);
    }

    #[test]
    fn selective_boundary_spans_whole_path() {
        let spp = SelectivePathPattern {
            path: vec![
                ExhaustiveNodeConnection::Relationship(PatternRelationship::new(
                    "r1",
                    "a",
                    "b",
                    SemanticDirection::Outgoing,
                )),
                ExhaustiveNodeConnection::Relationship(PatternRelationship::new(
                    "r2",
                    "b",
                    "c",
                    SemanticDirection::Outgoing,
                )),
            ],
            selections: BTreeSet::new(),
            selector: PathSelector::Shortest(1),
        };
        let conn = NodeConnection::Selective(spp);
        let boundary: Vec<_> = conn.boundary_nodes_set().into_iter().map(|v| v.0).collect();
        assert_eq!(boundary, vec!["a", "c"]);
        assert_eq!(conn.covered_ids().len(), 5);
        assert_eq!(conn.other_side(&Var::new("c")), Some(&Var::new("a")));
    }
}

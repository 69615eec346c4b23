//! Declarative query-graph intermediate representation.
//!
//! A [`QueryGraph`] describes one segment of a query: the nodes and node
//! connections to match, the predicates to apply, the identifiers bound by an
//! enclosing scope, nested optional matches and write clauses. Values are
//! built incrementally through consuming `add_*`/`with_*` transformations and
//! are never mutated once handed to the planner.
//!
//! Equality treats `optional_matches` as a multiset: two graphs listing the
//! same optional matches in a different order are equal and hash equally.

mod components;
mod hints;
mod pattern;

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use xxhash_rust::xxh64::Xxh64;

use crate::query::expr::{Expression, Predicate, Var};

pub use hints::{Hint, MutatingPattern};
pub use pattern::{
    ExhaustiveNodeConnection, NodeBinding, NodeConnection, PathSelector, PatternLength,
    PatternRelationship, QuantifiedPathPattern, Repetition, SelectivePathPattern,
    SemanticDirection, ShortestRelationshipPattern, VariableGrouping,
};

/// One segment of a query to be planned.
#[derive(Clone, Debug, Default)]
pub struct QueryGraph {
    /// Nodes to match.
    pub pattern_nodes: BTreeSet<Var>,
    /// Relationships to match.
    pub pattern_relationships: BTreeSet<PatternRelationship>,
    /// Quantified path patterns to match.
    pub quantified_path_patterns: BTreeSet<QuantifiedPathPattern>,
    /// Selective path patterns to match.
    pub selective_path_patterns: BTreeSet<SelectivePathPattern>,
    /// Legacy shortest-path patterns.
    pub shortest_relationship_patterns: BTreeSet<ShortestRelationshipPattern>,
    /// Identifiers bound by the enclosing scope.
    pub argument_ids: BTreeSet<Var>,
    /// WHERE predicates.
    pub selections: BTreeSet<Predicate>,
    /// OPTIONAL MATCH graphs, in clause order.
    pub optional_matches: Vec<QueryGraph>,
    /// Planner hints.
    pub hints: BTreeSet<Hint>,
    /// Write clauses, in clause order.
    pub mutating_patterns: Vec<MutatingPattern>,
}

impl QueryGraph {
    /// Empty query graph.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Relationships, quantified and selective patterns, in that order.
    pub fn node_connections(&self) -> Vec<NodeConnection> {
        self.pattern_relationships
            .iter()
            .cloned()
            .map(NodeConnection::Relationship)
            .chain(
                self.quantified_path_patterns
                    .iter()
                    .cloned()
                    .map(NodeConnection::Quantified),
            )
            .chain(
                self.selective_path_patterns
                    .iter()
                    .cloned()
                    .map(NodeConnection::Selective),
            )
            .collect()
    }

    /// Number of node connections.
    pub fn size(&self) -> usize {
        self.pattern_relationships.len()
            + self.quantified_path_patterns.len()
            + self.selective_path_patterns.len()
    }

    /// True when nothing at all is described.
    pub fn is_empty(&self) -> bool {
        self.pattern_nodes.is_empty()
            && self.size() == 0
            && self.shortest_relationship_patterns.is_empty()
            && self.argument_ids.is_empty()
            && self.selections.is_empty()
            && self.optional_matches.is_empty()
            && self.hints.is_empty()
            && self.mutating_patterns.is_empty()
    }

    /// Identifiers bound by pattern nodes, node connections, arguments and
    /// shortest-path patterns. Optional matches and updates are excluded.
    pub fn ids_without_optional_matches_or_updates(&self) -> BTreeSet<Var> {
        let mut ids = self.pattern_node_and_connection_ids();
        ids.extend(self.argument_ids.iter().cloned());
        for shortest in &self.shortest_relationship_patterns {
            ids.extend(shortest.names());
        }
        ids
    }

    /// Pattern nodes plus everything the node connections cover.
    pub fn pattern_node_and_connection_ids(&self) -> BTreeSet<Var> {
        let mut ids = self.pattern_nodes.clone();
        for conn in self.node_connections() {
            ids.extend(conn.covered_ids());
        }
        ids
    }

    /// Every identifier this graph or any nested graph binds.
    pub fn all_covered_ids(&self) -> BTreeSet<Var> {
        let mut ids = self.ids_without_optional_matches_or_updates();
        for optional in &self.optional_matches {
            ids.extend(optional.all_covered_ids());
        }
        for mutation in &self.mutating_patterns {
            ids.extend(mutation.covered_ids());
        }
        ids
    }

    /// Identifiers read by predicates, nested graphs, updates and arguments.
    pub fn dependencies(&self) -> BTreeSet<Var> {
        let mut deps: BTreeSet<Var> = self
            .selections
            .iter()
            .flat_map(|p| p.dependencies.iter().cloned())
            .collect();
        for conn in self.node_connections() {
            deps.extend(conn.dependencies());
        }
        for optional in &self.optional_matches {
            deps.extend(optional.dependencies());
        }
        for mutation in &self.mutating_patterns {
            deps.extend(mutation.dependencies());
        }
        deps.extend(self.argument_ids.iter().cloned());
        deps
    }

    /// `USING JOIN` hints.
    pub fn join_hints(&self) -> impl Iterator<Item = &Hint> {
        self.hints.iter().filter(|h| h.is_join())
    }

    /// Labels required on `var` by single-label predicates.
    pub fn labels_on(&self, var: &Var) -> Vec<(&Predicate, &str)> {
        self.selections
            .iter()
            .filter_map(|p| match p.as_label_test() {
                Some((v, label)) if v == var => Some((p, label)),
                _ => None,
            })
            .collect()
    }

    /// Adds pattern nodes.
    pub fn add_pattern_nodes<I, V>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Var>,
    {
        self.pattern_nodes.extend(nodes.into_iter().map(Into::into));
        self
    }

    /// Adds a relationship and its endpoints.
    pub fn add_pattern_relationship(mut self, rel: PatternRelationship) -> Self {
        self.pattern_nodes.insert(rel.left.clone());
        self.pattern_nodes.insert(rel.right.clone());
        self.pattern_relationships.insert(rel);
        self
    }

    /// Adds relationships and their endpoints.
    pub fn add_pattern_relationships(
        self,
        rels: impl IntoIterator<Item = PatternRelationship>,
    ) -> Self {
        rels.into_iter()
            .fold(self, |qg, rel| qg.add_pattern_relationship(rel))
    }

    /// Replaces the relationship set, leaving pattern nodes untouched.
    pub fn with_pattern_relationships(mut self, rels: BTreeSet<PatternRelationship>) -> Self {
        self.pattern_relationships = rels;
        self
    }

    /// Adds a quantified path pattern and its boundary nodes.
    pub fn add_quantified_path_pattern(mut self, qpp: QuantifiedPathPattern) -> Self {
        self.pattern_nodes.extend(qpp.boundary_nodes_set());
        self.quantified_path_patterns.insert(qpp);
        self
    }

    /// Adds a selective path pattern and its boundary nodes.
    pub fn add_selective_path_pattern(mut self, spp: SelectivePathPattern) -> Self {
        self.pattern_nodes.extend(spp.boundary_nodes_set());
        self.selective_path_patterns.insert(spp);
        self
    }

    /// Adds any node connection.
    pub fn add_node_connection(self, conn: NodeConnection) -> Self {
        match conn {
            NodeConnection::Relationship(rel) => self.add_pattern_relationship(rel),
            NodeConnection::Quantified(qpp) => self.add_quantified_path_pattern(qpp),
            NodeConnection::Selective(spp) => self.add_selective_path_pattern(spp),
        }
    }

    /// Adds several node connections.
    pub fn add_node_connections(self, conns: impl IntoIterator<Item = NodeConnection>) -> Self {
        conns
            .into_iter()
            .fold(self, |qg, conn| qg.add_node_connection(conn))
    }

    /// Adds shortest-path patterns.
    pub fn add_shortest_relationships(
        mut self,
        patterns: impl IntoIterator<Item = ShortestRelationshipPattern>,
    ) -> Self {
        self.shortest_relationship_patterns.extend(patterns);
        self
    }

    /// Adds argument identifiers.
    pub fn add_argument_ids<I, V>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Var>,
    {
        self.argument_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Replaces argument identifiers.
    pub fn with_argument_ids(mut self, ids: BTreeSet<Var>) -> Self {
        self.argument_ids = ids;
        self
    }

    /// Adds predicates, splitting conjunctions into separate selections.
    pub fn add_predicates(mut self, exprs: impl IntoIterator<Item = Expression>) -> Self {
        self.selections.extend(
            exprs
                .into_iter()
                .flat_map(Expression::conjuncts)
                .map(Predicate::new),
        );
        self
    }

    /// Adds already-built predicates.
    pub fn add_selections(mut self, preds: impl IntoIterator<Item = Predicate>) -> Self {
        self.selections.extend(preds);
        self
    }

    /// Replaces the predicate set.
    pub fn with_selections(mut self, preds: BTreeSet<Predicate>) -> Self {
        self.selections = preds;
        self
    }

    /// Adds hints.
    pub fn add_hints(mut self, hints: impl IntoIterator<Item = Hint>) -> Self {
        self.hints.extend(hints);
        self
    }

    /// Drops the given hints.
    pub fn without_hints(mut self, hints: &BTreeSet<Hint>) -> Self {
        self.hints.retain(|h| !hints.contains(h));
        self
    }

    /// Appends an optional match. Its arguments become the identifiers it
    /// shares with everything covered so far.
    pub fn add_optional_match(mut self, optional: QueryGraph) -> Self {
        let shared: BTreeSet<Var> = self
            .all_covered_ids()
            .intersection(&optional.all_covered_ids())
            .cloned()
            .collect();
        self.optional_matches
            .push(optional.add_argument_ids(shared));
        self
    }

    /// Replaces optional matches verbatim.
    pub fn with_optional_matches(mut self, optionals: Vec<QueryGraph>) -> Self {
        self.optional_matches = optionals;
        self
    }

    /// Appends write clauses.
    pub fn add_mutating_patterns(
        mut self,
        patterns: impl IntoIterator<Item = MutatingPattern>,
    ) -> Self {
        self.mutating_patterns.extend(patterns);
        self
    }

    /// Deterministic 64-bit fingerprint consistent with `Eq`.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn optional_match_fingerprints(&self) -> Vec<u64> {
        let mut fingerprints: Vec<u64> =
            self.optional_matches.iter().map(QueryGraph::fingerprint).collect();
        fingerprints.sort_unstable();
        fingerprints
    }
}

impl PartialEq for QueryGraph {
    fn eq(&self, other: &Self) -> bool {
        self.pattern_nodes == other.pattern_nodes
            && self.pattern_relationships == other.pattern_relationships
            && self.quantified_path_patterns == other.quantified_path_patterns
            && self.selective_path_patterns == other.selective_path_patterns
            && self.shortest_relationship_patterns == other.shortest_relationship_patterns
            && self.argument_ids == other.argument_ids
            && self.selections == other.selections
            && self.hints == other.hints
            && self.mutating_patterns == other.mutating_patterns
            && same_optional_matches(&self.optional_matches, &other.optional_matches)
    }
}

impl Eq for QueryGraph {}

/// Multiset equality.
fn same_optional_matches(left: &[QueryGraph], right: &[QueryGraph]) -> bool {
    let count = |side: &[QueryGraph], qg: &QueryGraph| side.iter().filter(|o| *o == qg).count();
    left.len() == right.len() && left.iter().all(|l| count(left, l) == count(right, l))
}

impl Hash for QueryGraph {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern_nodes.hash(state);
        self.pattern_relationships.hash(state);
        self.quantified_path_patterns.hash(state);
        self.selective_path_patterns.hash(state);
        self.shortest_relationship_patterns.hash(state);
        self.argument_ids.hash(state);
        self.selections.hash(state);
        self.hints.hash(state);
        self.mutating_patterns.hash(state);
        // Order-independent: hash the sorted nested fingerprints.
        self.optional_match_fingerprints().hash(state);
    }
}

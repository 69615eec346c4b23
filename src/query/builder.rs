//! Fluent query-graph builder.

use std::mem;

use crate::query::expr::{Expression, Var};
use crate::query::graph::{
    Hint, MutatingPattern, PatternLength, PatternRelationship, QuantifiedPathPattern, QueryGraph,
    SelectivePathPattern, SemanticDirection, ShortestRelationshipPattern,
};
use crate::types::{PenumbraError, Result};

/// Builds a [`QueryGraph`] clause by clause.
///
/// Errors are latched: the first invalid call is remembered, later calls are
/// ignored and [`QueryGraphBuilder::build`] reports it.
#[derive(Default)]
pub struct QueryGraphBuilder {
    qg: QueryGraph,
    error: Option<PenumbraError>,
}

impl QueryGraphBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pattern node.
    pub fn node(self, var: impl Into<Var>) -> Self {
        self.update(|qg| qg.add_pattern_nodes([var.into()]))
    }

    /// Adds a pattern node together with a label predicate.
    pub fn labeled_node(self, var: impl Into<Var>, label: impl Into<String>) -> Self {
        let var = var.into();
        self.update(|qg| {
            qg.add_pattern_nodes([var.clone()])
                .add_predicates([Expression::has_label(var, label)])
        })
    }

    /// Adds a single-hop relationship with optional type restriction.
    pub fn relationship<I, S>(
        self,
        name: impl Into<Var>,
        left: impl Into<Var>,
        right: impl Into<Var>,
        direction: SemanticDirection,
        types: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rel = PatternRelationship::new(name, left, right, direction).with_types(types);
        self.add_relationship(rel)
    }

    /// Adds a `*min..max` relationship.
    pub fn var_length_relationship(
        mut self,
        name: impl Into<Var>,
        left: impl Into<Var>,
        right: impl Into<Var>,
        direction: SemanticDirection,
        min: u32,
        max: Option<u32>,
    ) -> Self {
        if max.is_some_and(|max| max < min) {
            self.fail(PenumbraError::Invalid(
                "var-length relationship maximum is below its minimum",
            ));
            return self;
        }
        let rel = PatternRelationship::new(name, left, right, direction)
            .with_length(PatternLength::VarLength { min, max });
        self.add_relationship(rel)
    }

    /// Marks `var` as bound by the enclosing scope.
    pub fn argument(self, var: impl Into<Var>) -> Self {
        self.update(|qg| qg.add_argument_ids([var.into()]))
    }

    /// Adds a WHERE predicate. Conjunctions are split.
    pub fn predicate(self, expr: Expression) -> Self {
        self.update(|qg| qg.add_predicates([expr]))
    }

    /// Adds a planner hint. Hinted variables must already be declared.
    pub fn hint(mut self, hint: Hint) -> Self {
        if self.error.is_some() {
            return self;
        }
        let known = self.qg.all_covered_ids();
        if !hint.variables().is_subset(&known) {
            self.fail(PenumbraError::Invalid(
                "hint references an undeclared variable",
            ));
            return self;
        }
        self.update(|qg| qg.add_hints([hint]))
    }

    /// Appends an OPTIONAL MATCH built by `build`. Its arguments are the
    /// identifiers it shares with everything declared so far.
    pub fn optional<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryGraphBuilder) -> QueryGraphBuilder,
    {
        if self.error.is_some() {
            return self;
        }
        match build(QueryGraphBuilder::new()).build() {
            Ok(optional) => self.update(|qg| qg.add_optional_match(optional)),
            Err(err) => {
                self.fail(err);
                self
            }
        }
    }

    /// Adds a quantified path pattern.
    pub fn quantified(self, qpp: QuantifiedPathPattern) -> Self {
        self.update(|qg| qg.add_quantified_path_pattern(qpp))
    }

    /// Adds a selective path pattern.
    pub fn selective(self, spp: SelectivePathPattern) -> Self {
        self.update(|qg| qg.add_selective_path_pattern(spp))
    }

    /// Adds a legacy shortest-path pattern.
    pub fn shortest(self, pattern: ShortestRelationshipPattern) -> Self {
        self.update(|qg| qg.add_shortest_relationships([pattern]))
    }

    /// Appends a write clause.
    pub fn mutation(self, pattern: MutatingPattern) -> Self {
        self.update(|qg| qg.add_mutating_patterns([pattern]))
    }

    /// Finishes the builder.
    pub fn build(self) -> Result<QueryGraph> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.qg),
        }
    }

    fn add_relationship(mut self, rel: PatternRelationship) -> Self {
        if self.error.is_some() {
            return self;
        }
        let reused = self
            .qg
            .pattern_relationships
            .iter()
            .any(|existing| existing.name == rel.name && existing != &rel);
        if reused {
            self.fail(PenumbraError::Invalid(
                "relationship variable already bound to a different pattern",
            ));
            return self;
        }
        self.update(|qg| qg.add_pattern_relationship(rel))
    }

    fn update(mut self, f: impl FnOnce(QueryGraph) -> QueryGraph) -> Self {
        if self.error.is_none() {
            self.qg = f(mem::take(&mut self.qg));
        }
        self
    }

    fn fail(&mut self, err: PenumbraError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

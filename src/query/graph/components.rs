//! Connected-component decomposition.

use std::collections::{BTreeSet, VecDeque};

use tracing::trace;

use super::{Hint, NodeConnection, QueryGraph};
use crate::query::expr::{Predicate, Var};

impl QueryGraph {
    /// Splits the graph into independently plannable components.
    ///
    /// Components are maximal sets of pattern nodes reachable through node
    /// connections. Connections that reuse a relationship variable are
    /// treated as connected. A component whose identifiers or predicates touch
    /// an argument receives *all* arguments, and argument nodes are pulled into
    /// it. Predicates and hints that only read arguments go to the first
    /// component, which then carries the arguments too. Components touching
    /// arguments come first.
    ///
    /// Optional matches and write clauses stay with the parent graph.
    pub fn connected_components(&self) -> Vec<QueryGraph> {
        let connections = self.node_connections();
        let (local_predicates, stray_predicates): (Vec<Predicate>, Vec<Predicate>) = self
            .selections
            .iter()
            .cloned()
            .partition(|p| !p.dependencies.is_subset(&self.argument_ids));

        let (argument_nodes, other_nodes): (Vec<&Var>, Vec<&Var>) = self
            .pattern_nodes
            .iter()
            .partition(|n| self.argument_ids.contains(*n));

        let mut visited = BTreeSet::new();
        let mut components = Vec::new();
        for start in argument_nodes.into_iter().chain(other_nodes) {
            if visited.contains(start) {
                continue;
            }
            let component =
                self.component_starting_from(start, &connections, &local_predicates, &mut visited);
            trace!(
                start = %start,
                nodes = component.pattern_nodes.len(),
                connections = component.size(),
                "query_graph.component"
            );
            components.push(component);
        }

        // Stable: argument components keep their discovery order up front.
        components.sort_by_key(|c| c.argument_ids.is_empty());

        let stray_hints: Vec<Hint> = self
            .hints
            .iter()
            .filter(|h| h.variables().is_subset(&self.argument_ids))
            .filter(|h| !components.iter().any(|c| c.hints.contains(*h)))
            .cloned()
            .collect();
        if !stray_predicates.is_empty() || !stray_hints.is_empty() {
            if let Some(first) = components.first_mut() {
                let mut routed = std::mem::take(first)
                    .add_selections(stray_predicates)
                    .add_hints(stray_hints);
                if routed.argument_ids.is_empty() {
                    routed = routed.with_argument_ids(self.argument_ids.clone());
                }
                *first = routed;
            }
        }
        components
    }

    fn component_starting_from(
        &self,
        start: &Var,
        connections: &[NodeConnection],
        local_predicates: &[Predicate],
        visited: &mut BTreeSet<Var>,
    ) -> QueryGraph {
        let mut queue = VecDeque::from([start.clone()]);
        let mut nodes = BTreeSet::new();
        let mut taken: Vec<NodeConnection> = Vec::new();
        let mut pulled_arguments = false;

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.clone()) {
                continue;
            }
            nodes.insert(node.clone());

            let touching: Vec<&NodeConnection> = connections
                .iter()
                .filter(|c| c.boundary_nodes_set().contains(&node) && !taken.contains(c))
                .collect();
            let same_name: Vec<&NodeConnection> = connections
                .iter()
                .filter(|c| !taken.contains(c) && !touching.contains(c))
                .filter(|c| {
                    let names = c.relationship_ids();
                    touching
                        .iter()
                        .any(|t| !t.relationship_ids().is_disjoint(&names))
                })
                .collect();
            for conn in touching.into_iter().chain(same_name) {
                queue.extend(conn.boundary_nodes_set());
                taken.push(conn.clone());
            }

            if !pulled_arguments && self.touches_arguments(&nodes, &taken, local_predicates) {
                pulled_arguments = true;
                queue.extend(self.pattern_nodes.intersection(&self.argument_ids).cloned());
            }
        }

        let mut component = QueryGraph::empty()
            .add_pattern_nodes(nodes)
            .add_node_connections(taken);
        if pulled_arguments {
            component = component.with_argument_ids(self.argument_ids.clone());
        }

        let covered = component.ids_without_optional_matches_or_updates();
        let shortest: Vec<_> = self
            .shortest_relationship_patterns
            .iter()
            .filter(|p| covered.contains(&p.rel.left) && covered.contains(&p.rel.right))
            .cloned()
            .collect();
        let mut all_ids = covered;
        if pulled_arguments {
            all_ids.extend(self.argument_ids.iter().cloned());
        }
        for pattern in &shortest {
            all_ids.extend(pattern.names());
        }

        let predicates: BTreeSet<Predicate> = local_predicates
            .iter()
            .filter(|p| p.dependencies.is_subset(&all_ids))
            .cloned()
            .collect();
        let hints: Vec<_> = self
            .hints
            .iter()
            .filter(|h| h.variables().is_subset(&all_ids))
            .cloned()
            .collect();

        component
            .with_selections(predicates)
            .add_hints(hints)
            .add_shortest_relationships(shortest)
    }

    fn touches_arguments(
        &self,
        nodes: &BTreeSet<Var>,
        taken: &[NodeConnection],
        local_predicates: &[Predicate],
    ) -> bool {
        if self.argument_ids.is_empty() {
            return false;
        }
        let mut covered = nodes.clone();
        for conn in taken {
            covered.extend(conn.covered_ids());
            covered.extend(conn.dependencies());
        }
        if !covered.is_disjoint(&self.argument_ids) {
            return true;
        }
        local_predicates.iter().any(|p| {
            !p.dependencies.is_disjoint(&covered) && !p.dependencies.is_disjoint(&self.argument_ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::query::expr::{Expression, Var};
    use crate::query::graph::{Hint, PatternRelationship, QueryGraph, SemanticDirection};

    fn rel(name: &str, left: &str, right: &str) -> PatternRelationship {
        PatternRelationship::new(name, left, right, SemanticDirection::Outgoing)
    }

    fn names(ids: &BTreeSet<Var>) -> Vec<&str> {
        ids.iter().map(Var::as_str).collect()
    }

    #[test]
    fn chain_is_one_component() {
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r1", "a", "b"))
            .add_pattern_relationship(rel("r2", "b", "c"));
        let components = qg.connected_components();
        assert_eq!(components.len(), 1);
        assert_eq!(names(&components[0].pattern_nodes), vec!["a", "b", "c"]);
        assert_eq!(components[0].size(), 2);
    }

    #[test]
    fn disjoint_relationships_split() {
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r1", "a", "b"))
            .add_pattern_relationship(rel("r2", "x", "y"))
            .add_predicates([Expression::equals(
                Expression::prop("a", "id"),
                Expression::prop("x", "id"),
            )]);
        let components = qg.connected_components();
        assert_eq!(components.len(), 2);
        // Cross-component predicates belong to neither component.
        assert!(components.iter().all(|c| c.selections.is_empty()));
    }

    #[test]
    fn reused_relationship_name_joins_components() {
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r", "a", "b"))
            .add_pattern_relationship(rel("r", "x", "y"));
        let components = qg.connected_components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].pattern_nodes.len(), 4);
    }

    #[test]
    fn arguments_go_to_touching_component_first() {
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r1", "a", "b"))
            .add_pattern_relationship(rel("r2", "x", "y"))
            .add_argument_ids(["y", "z"])
            .add_predicates([Expression::equals(Expression::var("z"), Expression::lit(1_i64))]);
        let components = qg.connected_components();
        assert_eq!(components.len(), 2);
        assert_eq!(names(&components[0].pattern_nodes), vec!["x", "y"]);
        assert_eq!(names(&components[0].argument_ids), vec!["y", "z"]);
        assert_eq!(components[0].selections.len(), 1);
        assert!(components[1].argument_ids.is_empty());
    }

    #[test]
    fn predicate_on_argument_pulls_arguments() {
        let qg = QueryGraph::empty()
            .add_pattern_nodes(["a"])
            .add_argument_ids(["p"])
            .add_predicates([Expression::equals(
                Expression::prop("a", "id"),
                Expression::var("p"),
            )]);
        let components = qg.connected_components();
        assert_eq!(components.len(), 1);
        assert_eq!(names(&components[0].argument_ids), vec!["p"]);
        assert_eq!(components[0].selections.len(), 1);
    }

    #[test]
    fn argument_only_hint_lands_once_with_its_arguments() {
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r1", "a", "b"))
            .add_pattern_relationship(rel("r2", "x", "y"))
            .add_argument_ids(["z"])
            .add_hints([Hint::UsingJoin {
                vars: BTreeSet::from([Var::new("z")]),
            }]);
        let components = qg.connected_components();
        assert_eq!(components.len(), 2);
        let hints: Vec<usize> = components.iter().map(|c| c.hints.len()).collect();
        assert_eq!(hints, vec![1, 0]);
        assert_eq!(names(&components[0].argument_ids), vec!["z"]);
        assert!(components[1].argument_ids.is_empty());
    }

    #[test]
    fn empty_graph_has_no_components() {
        assert!(QueryGraph::empty().connected_components().is_empty());
    }
}

#![allow(missing_docs)]

use std::collections::BTreeSet;

use penumbra::query::expr::{Expression, Var};
use penumbra::query::graph::{PatternRelationship, SemanticDirection};
use penumbra::query::QueryGraph;
use proptest::prelude::*;

const NODE_NAMES: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

#[derive(Debug, Clone)]
struct GraphShape {
    nodes: Vec<usize>,
    edges: Vec<(usize, usize)>,
    arguments: Vec<usize>,
    predicates: Vec<(usize, usize)>,
}

fn arb_shape() -> impl Strategy<Value = GraphShape> {
    (
        prop::collection::vec(0..NODE_NAMES.len(), 0..6),
        prop::collection::vec((0..NODE_NAMES.len(), 0..NODE_NAMES.len()), 0..8),
        prop::collection::vec(0..NODE_NAMES.len(), 0..3),
        prop::collection::vec((0..NODE_NAMES.len(), 0..NODE_NAMES.len()), 0..3),
    )
        .prop_map(|(nodes, edges, arguments, predicates)| GraphShape {
            nodes,
            edges,
            arguments,
            predicates,
        })
}

fn build(shape: &GraphShape) -> QueryGraph {
    let mut qg =
        QueryGraph::empty().add_pattern_nodes(shape.nodes.iter().map(|&n| NODE_NAMES[n]));
    for (i, &(left, right)) in shape.edges.iter().enumerate() {
        qg = qg.add_pattern_relationship(PatternRelationship::new(
            format!("r{i}"),
            NODE_NAMES[left],
            NODE_NAMES[right],
            SemanticDirection::Outgoing,
        ));
    }
    let arguments: BTreeSet<Var> = shape
        .arguments
        .iter()
        .map(|&n| Var::new(NODE_NAMES[n]))
        .collect();
    let known = qg.pattern_nodes.clone();
    qg = qg.add_argument_ids(arguments.into_iter().filter(|a| known.contains(a)));
    qg.add_predicates(shape.predicates.iter().map(|&(l, r)| {
        Expression::equals(
            Expression::prop(NODE_NAMES[l], "k"),
            Expression::prop(NODE_NAMES[r], "k"),
        )
    }))
}

fn optional(i: usize) -> QueryGraph {
    QueryGraph::empty().add_pattern_relationship(PatternRelationship::new(
        format!("o{i}"),
        "a",
        NODE_NAMES[1 + i % (NODE_NAMES.len() - 1)],
        SemanticDirection::Both,
    ))
}

proptest! {
    #[test]
    fn prop_components_partition_pattern_nodes(shape in arb_shape()) {
        let qg = build(&shape);
        let components = qg.connected_components();

        let mut seen = BTreeSet::new();
        for component in &components {
            for node in &component.pattern_nodes {
                prop_assert!(seen.insert(node.clone()), "{} in two components", node);
            }
        }
        prop_assert_eq!(&seen, &qg.pattern_nodes);

        let relationships: usize = components.iter().map(|c| c.pattern_relationships.len()).sum();
        prop_assert_eq!(relationships, qg.pattern_relationships.len());

        for component in &components {
            let referenced: BTreeSet<Var> = component
                .ids_without_optional_matches_or_updates()
                .into_iter()
                .chain(component.selections.iter().flat_map(|p| p.dependencies.iter().cloned()))
                .filter(|id| qg.argument_ids.contains(id))
                .collect();
            prop_assert!(referenced.is_subset(&component.argument_ids));
        }
    }

    #[test]
    fn prop_optional_match_order_is_irrelevant(
        shape in arb_shape(),
        optionals in prop::collection::vec(0usize..4, 0..5),
        seed in any::<u64>(),
    ) {
        let base = build(&shape);
        let listed: Vec<QueryGraph> = optionals.iter().map(|&i| optional(i)).collect();
        let mut permuted = listed.clone();
        if !permuted.is_empty() {
            let len = permuted.len();
            permuted.rotate_left((seed as usize) % len);
        }
        permuted.reverse();

        let forward = base.clone().with_optional_matches(listed);
        let backward = base.with_optional_matches(permuted);

        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(forward.fingerprint(), backward.fingerprint());
    }
}

#[test]
fn optional_match_multiplicity_matters() {
    let base = QueryGraph::empty().add_pattern_nodes(["a"]);
    let twice_first = base
        .clone()
        .with_optional_matches(vec![optional(0), optional(0), optional(1)]);
    let twice_second = base.with_optional_matches(vec![optional(0), optional(1), optional(1)]);
    assert_ne!(twice_first, twice_second);
    assert_ne!(twice_first.fingerprint(), twice_second.fingerprint());
}

#![allow(missing_docs)]

use std::sync::Arc;

use penumbra::query::expr::{Expression, Var};
use penumbra::query::graph::SemanticDirection;
use penumbra::query::metadata::InMemoryMetadata;
use penumbra::query::order::ColumnOrder;
use penumbra::query::{
    InterestingOrder, PlanExplain, PlannerConfig, PlanningContext, QueryGraph, QueryGraphBuilder,
    QueryGraphSolver, QueryPlannerKit, SingleComponentPlanner,
};
use penumbra::Result;

fn context() -> PlanningContext {
    let metadata = InMemoryMetadata::new()
        .with_nodes(1_000)
        .with_label("Person", 200)
        .with_label("City", 50)
        .with_relationships(5_000)
        .with_relationship_type("KNOWS", 3_000)
        .with_relationship_type("LIVES_IN", 200)
        .with_node_index("Person", "name");
    PlanningContext::new(Arc::new(metadata), PlannerConfig::default())
}

fn chain() -> Result<QueryGraph> {
    QueryGraphBuilder::new()
        .relationship("r1", "a", "b", SemanticDirection::Outgoing, ["KNOWS"])
        .relationship("r2", "b", "c", SemanticDirection::Outgoing, ["KNOWS"])
        .build()
}

fn ids(names: &[&str]) -> Vec<Var> {
    names.iter().map(|n| Var::new(*n)).collect()
}

#[test]
fn two_hop_chain_is_one_component_covering_every_id() -> Result<()> {
    let qg = chain()?;
    let components = qg.connected_components();
    assert_eq!(components.len(), 1);
    assert_eq!(
        components[0].pattern_nodes.iter().cloned().collect::<Vec<_>>(),
        ids(&["a", "b", "c"])
    );

    let ctx = context();
    let plan = SingleComponentPlanner::new().plan_component(
        &components[0],
        &ctx,
        &QueryPlannerKit::default(),
        &InterestingOrder::empty(),
    )?;
    for id in ids(&["a", "r1", "b", "r2", "c"]) {
        assert!(plan.available_symbols.contains(&id), "missing {id}");
    }
    Ok(())
}

#[test]
fn disjoint_relationships_split_and_plan_independently() -> Result<()> {
    let qg = QueryGraphBuilder::new()
        .relationship("r1", "a", "b", SemanticDirection::Outgoing, Vec::<String>::new())
        .relationship("r2", "x", "y", SemanticDirection::Outgoing, Vec::<String>::new())
        .build()?;
    let components = qg.connected_components();
    assert_eq!(components.len(), 2);

    let ctx = context();
    let kit = QueryPlannerKit::default();
    let planner = SingleComponentPlanner::new();
    for component in &components {
        let plan = planner.plan_component(component, &ctx, &kit, &InterestingOrder::empty())?;
        let required = component.ids_without_optional_matches_or_updates();
        assert!(required.is_subset(&plan.available_symbols));
    }

    let whole = QueryGraphSolver::new().plan(&qg, &ctx, &kit, &InterestingOrder::empty())?;
    assert!(qg
        .ids_without_optional_matches_or_updates()
        .is_subset(&whole.available_symbols));
    Ok(())
}

#[test]
fn planning_is_deterministic_across_contexts() -> Result<()> {
    let qg = QueryGraphBuilder::new()
        .labeled_node("p", "Person")
        .relationship("k", "p", "f", SemanticDirection::Outgoing, ["KNOWS"])
        .relationship("l", "f", "c", SemanticDirection::Outgoing, ["LIVES_IN"])
        .labeled_node("c", "City")
        .predicate(Expression::equals(
            Expression::prop("p", "name"),
            Expression::lit("Ada"),
        ))
        .build()?;
    let kit = QueryPlannerKit::default();
    let order = InterestingOrder::empty();
    let first = QueryGraphSolver::new().plan(&qg, &context(), &kit, &order)?;
    let second = QueryGraphSolver::new().plan(&qg, &context(), &kit, &order)?;
    let (first, second) = (PlanExplain::of(&first), PlanExplain::of(&second));
    assert_eq!(first.plan_hash, second.plan_hash);
    assert_eq!(first.render(false), second.render(false));
    Ok(())
}

#[test]
fn index_seek_satisfies_matching_order_without_sort() -> Result<()> {
    let qg = QueryGraphBuilder::new()
        .labeled_node("p", "Person")
        .predicate(Expression::equals(
            Expression::prop("p", "name"),
            Expression::param("name"),
        ))
        .build()?;
    let order = InterestingOrder::required([ColumnOrder::asc(Expression::prop("p", "name"))]);
    let plan = QueryGraphSolver::new().plan(&qg, &context(), &QueryPlannerKit::default(), &order)?;
    assert_eq!(plan.count_ops("Sort"), 0);
    assert_eq!(plan.count_ops("NodeIndexSeek"), 1);
    Ok(())
}

#[test]
fn optional_matches_hang_off_the_mandatory_part() -> Result<()> {
    let qg = QueryGraphBuilder::new()
        .labeled_node("p", "Person")
        .optional(|o| o.relationship("l", "p", "c", SemanticDirection::Outgoing, ["LIVES_IN"]))
        .build()?;
    let plan = QueryGraphSolver::new().plan(
        &qg,
        &context(),
        &QueryPlannerKit::default(),
        &InterestingOrder::empty(),
    )?;
    assert_eq!(plan.op.name(), "Apply");
    assert_eq!(plan.count_ops("Optional"), 1);
    for id in ids(&["p", "l", "c"]) {
        assert!(plan.available_symbols.contains(&id), "missing {id}");
    }
    Ok(())
}

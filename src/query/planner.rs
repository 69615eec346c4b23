//! Planning of one connected component.
//!
//! The component planner asks the leaf provider for access paths, builds
//! every legal plan for each single node connection, seeds the IDP table with
//! the best of them (with and without the requested order) and lets the
//! solver combine them through expand and hash-join steps. Afterwards the
//! result is reconciled with the requested order, synthesizing a sort when
//! no enumerated plan delivers it.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::query::context::{PlanningContext, QueryPlannerKit};
use crate::query::errors::PlanningError;
use crate::query::expr::Var;
use crate::query::graph::{NodeConnection, QueryGraph};
use crate::query::idp::{
    CombinedSteps, Goal, IdRegistry, IdpSolver, IdpSolverMonitor, IdpTable, NoopIdpMonitor,
    SeedEntry, SolverStep,
};
use crate::query::logical::LogicalPlan;
use crate::query::order::InterestingOrder;

/// The two plans a component planner produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BestPlans {
    /// Cheapest plan regardless of order.
    pub best: LogicalPlan,
    /// Cheapest plan delivering the requested order, when one was requested.
    pub best_fulfilling_order: Option<LogicalPlan>,
}

impl BestPlans {
    /// The plan matching `order`: the ordered plan for a non-empty order,
    /// the cheapest plan otherwise.
    pub fn result(&self, order: &InterestingOrder) -> Result<LogicalPlan, PlanningError> {
        let wants_order = !order.is_empty();
        let surviving: Vec<&LogicalPlan> = [(false, Some(&self.best)), (true, self.best_fulfilling_order.as_ref())]
            .into_iter()
            .filter(|(sorted, _)| *sorted == wants_order)
            .filter_map(|(_, plan)| plan)
            .collect();
        match surviving.as_slice() {
            [only] => Ok((*only).clone()),
            other => Err(PlanningError::TableConvergence {
                goal: if wants_order { "ordered plan" } else { "unordered plan" }.to_owned(),
                found: other.len(),
            }),
        }
    }
}

struct StepContext<'a> {
    qg: &'a QueryGraph,
    ctx: &'a PlanningContext,
    kit: &'a QueryPlannerKit,
}

/// Extends a table entry by one more node connection.
struct ExpandStep;

impl<'a> SolverStep<NodeConnection, LogicalPlan, StepContext<'a>> for ExpandStep {
    fn candidates(
        &self,
        registry: &IdRegistry<NodeConnection>,
        goal: &Goal,
        table: &IdpTable<LogicalPlan>,
        step: &StepContext<'a>,
    ) -> Vec<LogicalPlan> {
        let mut out = Vec::new();
        for id in goal.iter() {
            let Some(conn) = registry.lookup(id) else {
                continue;
            };
            let rest = goal.without(id);
            for plan in table.plans_for(&rest) {
                if plan.solved.connections.contains(conn) {
                    continue;
                }
                if let Some(extended) = extend(plan, conn, step.ctx) {
                    out.push(step.kit.select(extended, step.qg, step.ctx));
                }
            }
        }
        out
    }
}

/// Hash-joins two table entries covering complementary parts of a goal.
struct JoinStep;

impl<'a> SolverStep<NodeConnection, LogicalPlan, StepContext<'a>> for JoinStep {
    fn candidates(
        &self,
        _registry: &IdRegistry<NodeConnection>,
        goal: &Goal,
        table: &IdpTable<LogicalPlan>,
        step: &StepContext<'a>,
    ) -> Vec<LogicalPlan> {
        let mut out = Vec::new();
        for (left_goal, _, lhs) in table.iter() {
            if left_goal.is_empty() || left_goal == goal || !left_goal.is_subset_of(goal) {
                continue;
            }
            let right_goal = goal.difference(left_goal);
            for rhs in table.plans_for(&right_goal) {
                let join_nodes = join_nodes(lhs, rhs, step.qg);
                if join_nodes.is_empty() {
                    continue;
                }
                let joined =
                    step.ctx
                        .producer()
                        .node_hash_join(join_nodes, lhs, rhs, &step.qg.hints);
                out.push(step.kit.select(joined, step.qg, step.ctx));
            }
        }
        out
    }
}

fn join_nodes(lhs: &LogicalPlan, rhs: &LogicalPlan, qg: &QueryGraph) -> BTreeSet<Var> {
    lhs.available_symbols
        .intersection(&rhs.available_symbols)
        .filter(|v| qg.pattern_nodes.contains(*v) && !qg.argument_ids.contains(*v))
        .cloned()
        .collect()
}

/// Solves `conn` on top of `plan`: projects endpoints of a bound relationship,
/// otherwise expands from whichever endpoint is bound (the left one first).
fn extend(plan: &LogicalPlan, conn: &NodeConnection, ctx: &PlanningContext) -> Option<LogicalPlan> {
    if let NodeConnection::Relationship(rel) = conn {
        if plan.available_symbols.contains(&rel.name) {
            return Some(ctx.producer().project_endpoints(plan, rel));
        }
    }
    let from = [conn.left(), conn.right()]
        .into_iter()
        .flatten()
        .find(|node| plan.available_symbols.contains(*node))?;
    ctx.producer().expand(plan, conn, from)
}

/// Plans one connected component.
#[derive(Clone)]
pub struct SingleComponentPlanner {
    monitor: Arc<dyn IdpSolverMonitor + Send + Sync>,
}

impl Default for SingleComponentPlanner {
    fn default() -> Self {
        Self {
            monitor: Arc::new(NoopIdpMonitor),
        }
    }
}

impl SingleComponentPlanner {
    /// Planner without a solver monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports solver progress to `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<dyn IdpSolverMonitor + Send + Sync>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Best plan for `qg` under `order`.
    ///
    /// Every error is a broken planning invariant and aborts the compilation.
    pub fn plan_component(
        &self,
        qg: &QueryGraph,
        ctx: &PlanningContext,
        kit: &QueryPlannerKit,
        order: &InterestingOrder,
    ) -> Result<LogicalPlan, PlanningError> {
        self.best_plans(qg, ctx, kit, order)?.result(order)
    }

    /// Both the cheapest plan and the cheapest order-fulfilling plan.
    pub fn best_plans(
        &self,
        qg: &QueryGraph,
        ctx: &PlanningContext,
        kit: &QueryPlannerKit,
        order: &InterestingOrder,
    ) -> Result<BestPlans, PlanningError> {
        let leaves: Vec<LogicalPlan> = kit
            .leaf_planner
            .leaf_plans(qg, order, ctx)
            .into_iter()
            .map(|leaf| kit.select(leaf, qg, ctx))
            .collect();
        debug!(
            leaves = leaves.len(),
            connections = qg.size(),
            "planner.component.leaves"
        );

        let (best, best_sorted) = if qg.size() == 0 {
            self.plan_without_connections(qg, leaves, ctx, kit, order)?
        } else {
            self.plan_with_idp(qg, &leaves, ctx, kit, order)?
        };

        let best = kit.select(best, qg, ctx);
        let best_fulfilling_order = if order.is_empty() {
            None
        } else {
            Some(match best_sorted {
                Some(plan) => kit.select(plan, qg, ctx),
                None => sort_on(&best, order, ctx)?,
            })
        };
        debug!(
            plan_id = best.id.0,
            ordered = best_fulfilling_order.is_some(),
            "planner.component.planned"
        );
        Ok(BestPlans {
            best,
            best_fulfilling_order,
        })
    }

    fn plan_without_connections(
        &self,
        qg: &QueryGraph,
        leaves: Vec<LogicalPlan>,
        ctx: &PlanningContext,
        kit: &QueryPlannerKit,
        order: &InterestingOrder,
    ) -> Result<(LogicalPlan, Option<LogicalPlan>), PlanningError> {
        let mut required = qg.ids_without_optional_matches_or_updates();
        for shortest in &qg.shortest_relationship_patterns {
            for name in shortest.names() {
                required.remove(&name);
            }
        }
        let covering: Vec<LogicalPlan> = leaves
            .into_iter()
            .filter(|leaf| required.is_subset(&leaf.available_symbols))
            .collect();
        let fulfilling: Vec<LogicalPlan> = covering
            .iter()
            .filter(|leaf| order.is_satisfied_by(&leaf.provided_order))
            .cloned()
            .collect();
        let best = kit
            .pick_best(covering, ctx)
            .ok_or_else(|| PlanningError::NoCoveringLeaf {
                ids: render_ids(&required),
            })?;
        Ok((best, kit.pick_best(fulfilling, ctx)))
    }

    fn plan_with_idp(
        &self,
        qg: &QueryGraph,
        leaves: &[LogicalPlan],
        ctx: &PlanningContext,
        kit: &QueryPlannerKit,
        order: &InterestingOrder,
    ) -> Result<(LogicalPlan, Option<LogicalPlan>), PlanningError> {
        let connections = qg.node_connections();
        let mut seed: Vec<SeedEntry<NodeConnection, LogicalPlan>> = Vec::new();
        for conn in &connections {
            let candidates = self.plan_single_pattern(conn, leaves, qg, ctx, kit);
            if candidates.is_empty() {
                return Err(PlanningError::NoAccessPlan {
                    pattern: conn.to_string(),
                });
            }
            let fulfilling: Vec<LogicalPlan> = candidates
                .iter()
                .filter(|plan| order.is_satisfied_by(&plan.provided_order))
                .cloned()
                .collect();
            if let Some(best) = kit.pick_best(candidates, ctx) {
                seed.push((vec![conn.clone()], false, best));
            }
            if let Some(best) = kit.pick_best(fulfilling, ctx) {
                seed.push((vec![conn.clone()], true, best));
            }
        }

        let expand = ExpandStep;
        let join = JoinStep;
        let mut steps: Vec<&dyn SolverStep<NodeConnection, LogicalPlan, StepContext<'_>>> =
            vec![&expand];
        if ctx.config().enable_hash_joins {
            steps.push(&join);
        }
        let generator = CombinedSteps::new(steps);
        let selector = |candidates: &[&LogicalPlan]| kit.ranker.best_index(candidates, ctx.metadata());
        let requirement = |plan: &LogicalPlan| order.is_satisfied_by(&plan.provided_order);
        let solver = IdpSolver::new(&generator, &selector)
            .with_requirement(&requirement)
            .with_monitor(self.monitor.as_ref())
            .with_max_table_size(ctx.config().idp_max_table_size)
            .with_iteration_duration(ctx.config().idp_iteration_duration);

        let step_ctx = StepContext { qg, ctx, kit };
        let solution = solver.solve(seed, connections.iter().cloned(), &step_ctx)?;
        debug!(iterations = solution.iterations, "planner.component.idp");
        let best = solution
            .best
            .ok_or_else(|| PlanningError::TableConvergence {
                goal: render_connections(&connections),
                found: 0,
            })?;
        Ok((best, solution.best_sorted))
    }

    /// Every legal plan solving exactly one node connection.
    fn plan_single_pattern(
        &self,
        conn: &NodeConnection,
        leaves: &[LogicalPlan],
        qg: &QueryGraph,
        ctx: &PlanningContext,
        kit: &QueryPlannerKit,
    ) -> Vec<LogicalPlan> {
        let producer = ctx.producer();
        let mut out = Vec::new();

        for leaf in leaves {
            if leaf.solved.connections.contains(conn) {
                out.push(leaf.clone());
            } else if leaf.solved.connections.is_empty() {
                if let Some(plan) = extend(leaf, conn, ctx) {
                    out.push(kit.select(plan, qg, ctx));
                }
            }
        }

        let (Some(left), Some(right)) = (conn.left(), conn.right()) else {
            return out;
        };
        if left == right {
            return out;
        }
        let left_leaves = single_node_leaves(leaves, left, right);
        let right_leaves = single_node_leaves(leaves, right, left);

        for lhs in &left_leaves {
            for rhs in &right_leaves {
                let product = kit.select(producer.cartesian_product(lhs, rhs), qg, ctx);
                if let Some(plan) = producer.expand(&product, conn, left) {
                    out.push(kit.select(plan, qg, ctx));
                }
            }
        }

        if qg.join_hints().next().is_some() && qg.size() == 1 {
            for (from, to, from_leaves, to_leaves) in [
                (left, right, &left_leaves, &right_leaves),
                (right, left, &right_leaves, &left_leaves),
            ] {
                for source in from_leaves {
                    let Some(expanded) = producer.expand(source, conn, from) else {
                        continue;
                    };
                    let expanded = kit.select(expanded, qg, ctx);
                    let join_on = BTreeSet::from([to.clone()]);
                    for other in to_leaves {
                        for (lhs, rhs) in [(&expanded, *other), (*other, &expanded)] {
                            let joined =
                                producer.node_hash_join(join_on.clone(), lhs, rhs, &qg.hints);
                            out.push(kit.select(joined, qg, ctx));
                        }
                    }
                }
            }
        }
        out
    }
}

fn single_node_leaves<'a>(leaves: &'a [LogicalPlan], node: &Var, other: &Var) -> Vec<&'a LogicalPlan> {
    leaves
        .iter()
        .filter(|leaf| {
            leaf.solved.connections.is_empty()
                && leaf.available_symbols.contains(node)
                && !leaf.available_symbols.contains(other)
        })
        .collect()
}

/// Appends a sort delivering `order`. Each sort item must read exactly one
/// variable bound by `plan`.
pub(crate) fn sort_on(
    plan: &LogicalPlan,
    order: &InterestingOrder,
    ctx: &PlanningContext,
) -> Result<LogicalPlan, PlanningError> {
    for column in order.columns() {
        let deps = column.dependencies();
        if deps.len() != 1 || !deps.is_subset(&plan.available_symbols) {
            return Err(PlanningError::NonSimpleSortItem {
                item: column.to_string(),
            });
        }
    }
    Ok(ctx.producer().sort(plan, order.columns().to_vec()))
}

fn render_ids(ids: &BTreeSet<Var>) -> String {
    ids.iter().map(Var::as_str).collect::<Vec<_>>().join(", ")
}

fn render_connections(connections: &[NodeConnection]) -> String {
    connections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::context::PlannerConfig;
    use crate::query::expr::Expression;
    use crate::query::graph::{Hint, PatternRelationship, SemanticDirection};
    use crate::query::metadata::InMemoryMetadata;
    use crate::query::order::ColumnOrder;

    fn rel(name: &str, left: &str, right: &str) -> PatternRelationship {
        PatternRelationship::new(name, left, right, SemanticDirection::Outgoing)
    }

    fn ctx() -> PlanningContext {
        PlanningContext::new(
            Arc::new(
                InMemoryMetadata::new()
                    .with_nodes(1_000)
                    .with_label("Person", 50)
                    .with_relationships(5_000)
                    .with_node_index("Person", "name"),
            ),
            PlannerConfig::default(),
        )
    }

    fn vars(names: &[&str]) -> BTreeSet<Var> {
        names.iter().map(|n| Var::new(*n)).collect()
    }

    #[test]
    fn chain_plan_binds_every_identifier() {
        let ctx = ctx();
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r1", "a", "b"))
            .add_pattern_relationship(rel("r2", "b", "c"));
        let plan = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx, &QueryPlannerKit::default(), &InterestingOrder::empty())
            .expect("plan");
        assert!(vars(&["a", "b", "c", "r1", "r2"]).is_subset(&plan.available_symbols));
        assert_eq!(plan.solved.connections.len(), 2);
    }

    #[test]
    fn planning_is_deterministic() {
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r1", "a", "b"))
            .add_pattern_relationship(rel("r2", "b", "c"))
            .add_pattern_relationship(rel("r3", "c", "a"))
            .add_predicates([Expression::has_label("a", "Person")]);
        let render = |plan: &LogicalPlan| {
            let mut ops = Vec::new();
            plan.walk(&mut |p| ops.push(p.op.clone()));
            ops
        };
        let first = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx(), &QueryPlannerKit::default(), &InterestingOrder::empty())
            .expect("plan");
        let second = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx(), &QueryPlannerKit::default(), &InterestingOrder::empty())
            .expect("plan");
        assert_eq!(render(&first), render(&second));
    }

    #[test]
    fn satisfiable_order_avoids_sort() {
        let ctx = ctx();
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r", "a", "b"))
            .add_predicates([
                Expression::has_label("a", "Person"),
                Expression::equals(Expression::prop("a", "name"), Expression::lit("Ada")),
            ]);
        let order = InterestingOrder::required([ColumnOrder::asc(Expression::prop("a", "name"))]);
        let plan = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx, &QueryPlannerKit::default(), &order)
            .expect("plan");
        assert_eq!(plan.count_ops("Sort"), 0);
        assert!(order.is_satisfied_by(&plan.provided_order));
    }

    #[test]
    fn unsatisfiable_order_gets_exactly_one_sort() {
        let ctx = ctx();
        let qg = QueryGraph::empty().add_pattern_relationship(rel("r", "a", "b"));
        let order = InterestingOrder::required([ColumnOrder::desc(Expression::prop("b", "age"))]);
        let plans = SingleComponentPlanner::new()
            .best_plans(&qg, &ctx, &QueryPlannerKit::default(), &order)
            .expect("plan");
        let ordered = plans.best_fulfilling_order.expect("ordered plan");
        assert_eq!(ordered.op.name(), "Sort");
        assert_eq!(ordered.count_ops("Sort"), 1);
        assert_eq!(ordered.lhs(), Some(&plans.best));
    }

    #[test]
    fn sort_item_over_two_variables_is_fatal() {
        let ctx = ctx();
        let qg = QueryGraph::empty().add_pattern_relationship(rel("r", "a", "b"));
        let order = InterestingOrder::required([ColumnOrder::asc(Expression::equals(
            Expression::var("a"),
            Expression::var("b"),
        ))]);
        let err = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx, &QueryPlannerKit::default(), &order)
            .expect_err("non simple sort item");
        assert_eq!(err.code(), "NonSimpleSortItem");
    }

    #[test]
    fn single_node_picks_covering_leaf() {
        let ctx = ctx();
        let qg = QueryGraph::empty()
            .add_pattern_nodes(["n"])
            .add_predicates([Expression::has_label("n", "Person")]);
        let plan = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx, &QueryPlannerKit::default(), &InterestingOrder::empty())
            .expect("plan");
        assert_eq!(plan.op.name(), "NodeByLabelScan");
    }

    #[test]
    fn missing_covering_leaf_is_fatal() {
        struct NoLeaves;
        impl crate::query::leaf::LeafPlanProvider for NoLeaves {
            fn leaf_plans(
                &self,
                _qg: &QueryGraph,
                _order: &InterestingOrder,
                _ctx: &PlanningContext,
            ) -> Vec<LogicalPlan> {
                Vec::new()
            }
        }
        let kit = QueryPlannerKit::new(Arc::new(NoLeaves), QueryPlannerKit::default().ranker);
        let qg = QueryGraph::empty().add_pattern_nodes(["n"]);
        let err = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx(), &kit, &InterestingOrder::empty())
            .expect_err("no leaves");
        assert_eq!(err, PlanningError::NoCoveringLeaf { ids: "n".into() });

        let qg = QueryGraph::empty().add_pattern_relationship(rel("r", "a", "b"));
        let err = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx(), &kit, &InterestingOrder::empty())
            .expect_err("no access plan");
        assert_eq!(err.code(), "NoAccessPlan");
    }

    #[test]
    fn join_hint_makes_hash_join_reachable() {
        let ctx = ctx();
        let qg = QueryGraph::empty()
            .add_pattern_relationship(rel("r", "a", "b"))
            .add_hints([Hint::UsingJoin { vars: vars(&["b"]) }]);
        let plans = SingleComponentPlanner::new().plan_single_pattern(
            &qg.node_connections()[0],
            &DefaultLeavesFor::leaves(&qg, &ctx),
            &qg,
            &ctx,
            &QueryPlannerKit::default(),
        );
        assert!(plans.iter().any(|p| p.op.name() == "NodeHashJoin"
            && p.solved.hints.contains(&Hint::UsingJoin { vars: vars(&["b"]) })));
    }

    struct DefaultLeavesFor;

    impl DefaultLeavesFor {
        fn leaves(qg: &QueryGraph, ctx: &PlanningContext) -> Vec<LogicalPlan> {
            use crate::query::leaf::{DefaultLeafPlanner, LeafPlanProvider};
            DefaultLeafPlanner.leaf_plans(qg, &InterestingOrder::empty(), ctx)
        }
    }

    #[test]
    fn tiny_table_budget_still_plans_long_chain() {
        let ctx = PlanningContext::new(
            Arc::new(InMemoryMetadata::new().with_nodes(10)),
            PlannerConfig::default().idp_max_table_size(1),
        );
        let qg = (0..6).fold(QueryGraph::empty(), |qg, i| {
            qg.add_pattern_relationship(rel(&format!("r{i}"), &format!("n{i}"), &format!("n{}", i + 1)))
        });
        let plan = SingleComponentPlanner::new()
            .plan_component(&qg, &ctx, &QueryPlannerKit::default(), &InterestingOrder::empty())
            .expect("plan");
        assert_eq!(plan.solved.connections.len(), 6);
    }
}

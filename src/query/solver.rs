//! Whole-query-graph planning.
//!
//! Splits a query graph into connected components, plans each one, connects
//! the component plans with cartesian products (or hash joins where they
//! overlap) and finally attaches optional matches in clause order.

use std::collections::BTreeSet;

use tracing::debug;

use crate::query::context::{PlanningContext, QueryPlannerKit};
use crate::query::errors::PlanningError;
use crate::query::expr::Var;
use crate::query::graph::QueryGraph;
use crate::query::idp::{Goal, IdRegistry, IdpSolver, IdpTable, SeedEntry};
use crate::query::logical::LogicalPlan;
use crate::query::order::InterestingOrder;
use crate::query::planner::{sort_on, SingleComponentPlanner};
use crate::types::Result;

/// Plans complete query graphs.
#[derive(Clone, Default)]
pub struct QueryGraphSolver {
    component_planner: SingleComponentPlanner,
}

impl QueryGraphSolver {
    /// Solver with the default component planner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `planner` for every connected component.
    pub fn with_component_planner(mut self, planner: SingleComponentPlanner) -> Self {
        self.component_planner = planner;
        self
    }

    /// Plans `qg`, delivering `order` when it is non-empty.
    pub fn plan(
        &self,
        qg: &QueryGraph,
        ctx: &PlanningContext,
        kit: &QueryPlannerKit,
        order: &InterestingOrder,
    ) -> Result<LogicalPlan> {
        let components = qg.connected_components();
        debug!(components = components.len(), "planner.solver.components");

        let plan = match components.as_slice() {
            [] => {
                let leaf = ctx
                    .producer()
                    .argument(&qg.argument_ids, BTreeSet::new());
                kit.select(leaf, qg, ctx)
            }
            [only] if qg.optional_matches.is_empty() => {
                self.component_planner.plan_component(only, ctx, kit, order)?
            }
            _ => {
                let mut plans = Vec::with_capacity(components.len());
                for component in &components {
                    plans.push(self.component_planner.plan_component(
                        component,
                        ctx,
                        kit,
                        &InterestingOrder::empty(),
                    )?);
                }
                self.connect_components(plans, qg, ctx, kit)?
            }
        };
        let mut plan = kit.select(plan, qg, ctx);

        for optional in &qg.optional_matches {
            plan = self.plan_optional_match(plan, optional, ctx, kit)?;
        }

        if !order.is_empty() && !order.is_satisfied_by(&plan.provided_order) {
            plan = sort_on(&plan, order, ctx)?;
        }
        Ok(plan)
    }

    fn connect_components(
        &self,
        plans: Vec<LogicalPlan>,
        qg: &QueryGraph,
        ctx: &PlanningContext,
        kit: &QueryPlannerKit,
    ) -> std::result::Result<LogicalPlan, PlanningError> {
        let count = plans.len();
        let seed: Vec<SeedEntry<usize, LogicalPlan>> = plans
            .into_iter()
            .enumerate()
            .map(|(idx, plan)| (vec![idx], false, plan))
            .collect();

        let generator = |_registry: &IdRegistry<usize>,
                         goal: &Goal,
                         table: &IdpTable<LogicalPlan>,
                         _ctx: &()|
         -> Vec<LogicalPlan> {
            let producer = ctx.producer();
            let mut out = Vec::new();
            for (left_goal, _, lhs) in table.iter() {
                if left_goal.is_empty() || left_goal == goal || !left_goal.is_subset_of(goal) {
                    continue;
                }
                for rhs in table.plans_for(&goal.difference(left_goal)) {
                    out.push(kit.select(producer.cartesian_product(lhs, rhs), qg, ctx));
                    let overlap: BTreeSet<Var> = lhs
                        .available_symbols
                        .intersection(&rhs.available_symbols)
                        .filter(|v| !qg.argument_ids.contains(*v))
                        .cloned()
                        .collect();
                    if !overlap.is_empty() {
                        let joined = producer.node_hash_join(overlap, lhs, rhs, &qg.hints);
                        out.push(kit.select(joined, qg, ctx));
                    }
                }
            }
            out
        };
        let selector = |candidates: &[&LogicalPlan]| kit.ranker.best_index(candidates, ctx.metadata());
        let solver: IdpSolver<'_, usize, LogicalPlan, ()> = IdpSolver::new(&generator, &selector)
            .with_max_table_size(ctx.config().idp_max_table_size)
            .with_iteration_duration(ctx.config().idp_iteration_duration);

        let solution = solver.solve(seed, 0..count, &())?;
        debug!(
            components = count,
            iterations = solution.iterations,
            "planner.solver.connected"
        );
        solution
            .best
            .ok_or_else(|| PlanningError::UnplannableComponent {
                component: render_nodes(&qg.pattern_nodes),
            })
    }

    /// `Apply(plan, Optional(rhs))` where `rhs` is planned on top of the
    /// optional match's arguments.
    fn plan_optional_match(
        &self,
        plan: LogicalPlan,
        optional: &QueryGraph,
        ctx: &PlanningContext,
        kit: &QueryPlannerKit,
    ) -> Result<LogicalPlan> {
        let producer = ctx.producer();
        let mut rhs = self.plan(optional, ctx, kit, &InterestingOrder::empty())?;
        if !optional.argument_ids.is_subset(&rhs.available_symbols) {
            let argument = producer.argument(&optional.argument_ids, BTreeSet::new());
            rhs = producer.cartesian_product(&argument, &rhs);
        }
        let optional_plan = producer.optional(&rhs, &optional.argument_ids);
        debug!(
            arguments = optional.argument_ids.len(),
            "planner.solver.optional"
        );
        Ok(producer.apply(&plan, &optional_plan))
    }
}

fn render_nodes(nodes: &BTreeSet<Var>) -> String {
    nodes.iter().map(Var::as_str).collect::<Vec<_>>().join(", ")
}

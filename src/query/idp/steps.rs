//! Strategy objects plugged into the solver.

use super::registry::{Goal, IdRegistry};
use super::table::IdpTable;

/// Generates candidate results for a goal from results already in the table.
pub trait SolverStep<S, R, C> {
    /// Candidates solving exactly `goal`. May be empty.
    fn candidates(
        &self,
        registry: &IdRegistry<S>,
        goal: &Goal,
        table: &IdpTable<R>,
        context: &C,
    ) -> Vec<R>;
}

impl<S, R, C, F> SolverStep<S, R, C> for F
where
    F: Fn(&IdRegistry<S>, &Goal, &IdpTable<R>, &C) -> Vec<R>,
{
    fn candidates(
        &self,
        registry: &IdRegistry<S>,
        goal: &Goal,
        table: &IdpTable<R>,
        context: &C,
    ) -> Vec<R> {
        self(registry, goal, table, context)
    }
}

/// Runs several steps and concatenates their candidates in order.
pub struct CombinedSteps<'a, S, R, C> {
    steps: Vec<&'a dyn SolverStep<S, R, C>>,
}

impl<'a, S, R, C> CombinedSteps<'a, S, R, C> {
    /// Combines `steps`.
    pub fn new(steps: Vec<&'a dyn SolverStep<S, R, C>>) -> Self {
        Self { steps }
    }
}

impl<S, R, C> SolverStep<S, R, C> for CombinedSteps<'_, S, R, C> {
    fn candidates(
        &self,
        registry: &IdRegistry<S>,
        goal: &Goal,
        table: &IdpTable<R>,
        context: &C,
    ) -> Vec<R> {
        self.steps
            .iter()
            .flat_map(|step| step.candidates(registry, goal, table, context))
            .collect()
    }
}

/// Secondary property a result may fulfil, such as a required output order.
pub trait ExtraRequirement<R> {
    /// True when `candidate` fulfils the requirement.
    fn is_fulfilled_by(&self, candidate: &R) -> bool;
}

/// Requirement nothing fulfils; the table only holds unsorted entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoExtraRequirement;

impl<R> ExtraRequirement<R> for NoExtraRequirement {
    fn is_fulfilled_by(&self, _candidate: &R) -> bool {
        false
    }
}

impl<R, F> ExtraRequirement<R> for F
where
    F: Fn(&R) -> bool,
{
    fn is_fulfilled_by(&self, candidate: &R) -> bool {
        self(candidate)
    }
}

/// Ranking function: picks the best of competing results.
pub trait Selector<R> {
    /// Position of the best candidate, `None` when empty.
    fn best_index(&self, candidates: &[&R]) -> Option<usize>;

    /// Consumes `candidates` and returns the best one.
    fn select_best(&self, mut candidates: Vec<R>) -> Option<R> {
        let idx = {
            let refs: Vec<&R> = candidates.iter().collect();
            self.best_index(&refs)?
        };
        (idx < candidates.len()).then(|| candidates.swap_remove(idx))
    }
}

impl<R, F> Selector<R> for F
where
    F: Fn(&[&R]) -> Option<usize>,
{
    fn best_index(&self, candidates: &[&R]) -> Option<usize> {
        self(candidates)
    }
}

/// Progress events of a solver run. All methods default to no-ops.
pub trait IdpSolverMonitor {
    /// An iteration starts with `todo` solvables left.
    fn start_iteration(&self, _iteration: usize, _todo: usize) {}
    /// An iteration compacted a block of `depth` solvables.
    fn end_iteration(&self, _iteration: usize, _depth: usize, _table_size: usize) {}
    /// The solver finished after `iterations` iterations.
    fn found_plan_after(&self, _iterations: usize) {}
}

/// Monitor that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopIdpMonitor;

impl IdpSolverMonitor for NoopIdpMonitor {}

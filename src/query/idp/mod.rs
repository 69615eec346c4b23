//! Iterative dynamic programming (IDP) join enumeration.
//!
//! The solver is generic over the solvable type `S`, the result type `R` and
//! a context `C` handed to the steps. It starts from a seed table holding one
//! result per single solvable and grows results for blocks of 2, 3, ...
//! solvables by asking a [`SolverStep`] for candidates and keeping the best
//! per `(goal, sorted)` key as judged by a [`Selector`].
//!
//! An iteration stops growing blocks once the table exceeds its size budget
//! or the iteration runs out of time (block size 2 is always completed). The
//! best result of the largest completed block is then compacted into a new
//! solvable, every other table entry mentioning its ids is dropped, and the
//! next iteration starts with a smaller to-do set. The run ends when a single
//! solvable is left.
//!
//! Compaction picks the winner among unsorted entries of the completed block
//! in ascending goal order, so equally ranked blocks resolve to the one with
//! the smallest ids. Results are therefore a pure function of the seed, the
//! steps and the selector.

mod registry;
mod steps;
mod table;

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::query::errors::PlanningError;

pub use registry::{Goal, IdRegistry, SolvableId};
pub use steps::{
    CombinedSteps, ExtraRequirement, IdpSolverMonitor, NoExtraRequirement, NoopIdpMonitor,
    Selector, SolverStep,
};
pub use table::IdpTable;

/// Seed entry: the solvables a result covers, whether it fulfils the extra
/// requirement, and the result itself.
pub type SeedEntry<S, R> = (Vec<S>, bool, R);

/// Final results for the full goal.
#[derive(Clone, Debug)]
pub struct IdpSolution<R> {
    /// Best result regardless of the extra requirement.
    pub best: Option<R>,
    /// Best result fulfilling the extra requirement.
    pub best_sorted: Option<R>,
    /// Number of compaction iterations that ran.
    pub iterations: usize,
}

/// Budgeted IDP solver.
pub struct IdpSolver<'a, S, R, C> {
    generator: &'a dyn SolverStep<S, R, C>,
    selector: &'a dyn Selector<R>,
    requirement: &'a dyn ExtraRequirement<R>,
    monitor: &'a dyn IdpSolverMonitor,
    max_table_size: usize,
    iteration_duration: Duration,
}

impl<'a, S, R, C> IdpSolver<'a, S, R, C>
where
    S: Ord + Clone,
    R: Clone,
{
    /// Solver with default budgets, no extra requirement and no monitor.
    pub fn new(generator: &'a dyn SolverStep<S, R, C>, selector: &'a dyn Selector<R>) -> Self {
        Self {
            generator,
            selector,
            requirement: &NoExtraRequirement,
            monitor: &NoopIdpMonitor,
            max_table_size: crate::query::context::DEFAULT_IDP_MAX_TABLE_SIZE,
            iteration_duration: crate::query::context::DEFAULT_IDP_ITERATION_DURATION,
        }
    }

    /// Tracks a second, requirement-fulfilling entry per goal.
    pub fn with_requirement(mut self, requirement: &'a dyn ExtraRequirement<R>) -> Self {
        self.requirement = requirement;
        self
    }

    /// Reports progress to `monitor`.
    pub fn with_monitor(mut self, monitor: &'a dyn IdpSolverMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Table size after which block growth stops for the iteration.
    pub fn with_max_table_size(mut self, size: usize) -> Self {
        self.max_table_size = size;
        self
    }

    /// Time after which block growth stops for the iteration.
    pub fn with_iteration_duration(mut self, duration: Duration) -> Self {
        self.iteration_duration = duration;
        self
    }

    /// Solves `todo` starting from `seed`.
    ///
    /// Seed entries for solvables outside `todo` are kept but never combined.
    /// With fewer than two solvables no iteration runs and the seed entries
    /// of the single solvable are returned.
    ///
    /// Exhausting the iteration time or the table size budget never fails:
    /// block growth stops and the largest completed block size is compacted,
    /// leaving the rest to the next iteration. Pairs always complete, so
    /// only a generator that yields nothing for a pair fails.
    pub fn solve(
        &self,
        seed: impl IntoIterator<Item = SeedEntry<S, R>>,
        todo: impl IntoIterator<Item = S>,
        context: &C,
    ) -> Result<IdpSolution<R>, PlanningError> {
        let mut registry = IdRegistry::new();
        let mut table = IdpTable::new();
        for (solvables, sorted, result) in seed {
            let goal = registry.register_all(solvables);
            table.put(goal, sorted, result);
        }
        let mut todo: Goal = registry.register_all(todo);

        let mut iteration = 0;
        while todo.len() > 1 {
            iteration += 1;
            self.monitor.start_iteration(iteration, todo.len());
            debug!(iteration, todo = todo.len(), "idp.iteration.start");
            let depth = self.grow_blocks(&registry, &mut table, &todo, context);
            if depth == 0 {
                return Err(PlanningError::UnfinishedIteration { iteration });
            }
            todo = self.compact(&mut registry, &mut table, todo, depth)?;
            self.monitor.end_iteration(iteration, depth, table.len());
            debug!(
                iteration,
                depth,
                table_size = table.len(),
                todo = todo.len(),
                "idp.iteration.end"
            );
        }
        self.monitor.found_plan_after(iteration);

        Ok(IdpSolution {
            best: table.remove(&todo, false),
            best_sorted: table.remove(&todo, true),
            iterations: iteration,
        })
    }

    /// Fills the table for blocks of growing size. Returns the largest block
    /// size whose goals were all processed.
    fn grow_blocks(
        &self,
        registry: &IdRegistry<S>,
        table: &mut IdpTable<R>,
        todo: &Goal,
        context: &C,
    ) -> usize {
        let started = Instant::now();
        let ids: Vec<SolvableId> = todo.iter().collect();
        let mut largest_finished = 0;
        let mut keep_going = true;
        let mut block_size = 2;
        while keep_going && block_size <= ids.len() {
            let mut finished = true;
            for goal in combinations(&ids, block_size) {
                if !keep_going {
                    finished = false;
                    break;
                }
                if table.contains(&goal) {
                    continue;
                }
                let candidates = self.generator.candidates(registry, &goal, table, context);
                trace!(goal = %goal, candidates = candidates.len(), "idp.goal");
                let fulfilling: Vec<R> = candidates
                    .iter()
                    .filter(|c| self.requirement.is_fulfilled_by(c))
                    .cloned()
                    .collect();
                if let Some(best) = self.selector.select_best(candidates) {
                    table.put(goal.clone(), false, best);
                }
                if let Some(best) = self.selector.select_best(fulfilling) {
                    table.put(goal, true, best);
                }
                keep_going = block_size == 2
                    || (table.len() <= self.max_table_size
                        && started.elapsed() < self.iteration_duration);
            }
            if finished {
                largest_finished = block_size;
            }
            block_size += 1;
        }
        largest_finished
    }

    fn compact(
        &self,
        registry: &mut IdRegistry<S>,
        table: &mut IdpTable<R>,
        todo: Goal,
        depth: usize,
    ) -> Result<Goal, PlanningError> {
        let best_goal = {
            let block: Vec<(&Goal, &R)> = table
                .unsorted_plans_of_size(depth)
                .filter(|(goal, _)| goal.is_subset_of(&todo))
                .collect();
            let refs: Vec<&R> = block.iter().map(|(_, result)| *result).collect();
            let idx = self
                .selector
                .best_index(&refs)
                .filter(|idx| *idx < block.len())
                .ok_or(PlanningError::NoSolutionForBlock { size: depth })?;
            block[idx].0.clone()
        };

        let compacted = Goal::single(registry.compact(&best_goal));
        let unsorted = table.remove(&best_goal, false);
        let sorted = table.remove(&best_goal, true);
        table.remove_all_traces_of(&best_goal);
        if let Some(result) = unsorted {
            table.put(compacted.clone(), false, result);
        }
        if let Some(result) = sorted {
            table.put(compacted.clone(), true, result);
        }
        trace!(goal = %best_goal, into = %compacted, "idp.compact");
        Ok(todo
            .difference(&best_goal)
            .iter()
            .chain(compacted.iter())
            .collect())
    }
}

/// All `k`-element subsets of `ids` in lexicographic order.
fn combinations(ids: &[SolvableId], k: usize) -> impl Iterator<Item = Goal> + '_ {
    let n = ids.len();
    let mut indices: Vec<usize> = (0..k).collect();
    let mut done = k > n || k == 0;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let goal: Goal = indices.iter().map(|&i| ids[i]).collect();
        // Advance to the next combination.
        let mut pos = k;
        loop {
            if pos == 0 {
                done = true;
                break;
            }
            pos -= 1;
            if indices[pos] != pos + n - k {
                indices[pos] += 1;
                for next in pos + 1..k {
                    indices[next] = indices[next - 1] + 1;
                }
                break;
            }
        }
        Some(goal)
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    use super::*;

    /// Results are the sets of letters solved so far plus an accumulated
    /// cost; joining two disjoint results adds their costs and one per join.
    type Plan = (BTreeSet<char>, u32);

    fn cheapest(candidates: &[&Plan]) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (idx, (_, cost)) in candidates.iter().enumerate() {
            if best.map_or(true, |(_, b)| *cost < b) {
                best = Some((idx, *cost));
            }
        }
        best.map(|(idx, _)| idx)
    }

    fn join_step(
        _registry: &IdRegistry<char>,
        goal: &Goal,
        table: &IdpTable<Plan>,
        _ctx: &(),
    ) -> Vec<Plan> {
        let mut out = Vec::new();
        for (left_goal, _, left) in table.iter() {
            if left_goal.is_empty() || !left_goal.is_subset_of(goal) || left_goal == goal {
                continue;
            }
            let right_goal = goal.difference(left_goal);
            for right in table.plans_for(&right_goal) {
                let letters = left.0.union(&right.0).copied().collect();
                out.push((letters, left.1 + right.1 + 1));
            }
        }
        out
    }

    fn seed(letters: &str) -> Vec<SeedEntry<char, Plan>> {
        letters
            .chars()
            .map(|c| (vec![c], false, (BTreeSet::from([c]), 1)))
            .collect()
    }

    #[test]
    fn combinations_are_lexicographic() {
        let ids: Vec<SolvableId> = (0..4).map(SolvableId).collect();
        let rendered: Vec<String> = combinations(&ids, 2).map(|g| g.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "{#0, #1}", "{#0, #2}", "{#0, #3}", "{#1, #2}", "{#1, #3}", "{#2, #3}"
            ]
        );
        assert_eq!(combinations(&ids, 4).count(), 1);
        assert_eq!(combinations(&ids, 5).count(), 0);
    }

    #[test]
    fn solves_all_units_in_one_iteration_with_large_budget() {
        let solver: IdpSolver<'_, char, Plan, ()> = IdpSolver::new(&join_step, &cheapest);
        let solution = solver.solve(seed("abcd"), "abcd".chars(), &()).expect("solve");
        let (letters, cost) = solution.best.expect("plan");
        assert_eq!(letters.into_iter().collect::<String>(), "abcd");
        assert_eq!(cost, 7);
        assert_eq!(solution.iterations, 1);
        assert!(solution.best_sorted.is_none());
    }

    #[test]
    fn tiny_budget_forces_compaction_but_still_converges() {
        struct Depths(RefCell<Vec<usize>>);
        impl IdpSolverMonitor for Depths {
            fn end_iteration(&self, _iteration: usize, depth: usize, _table_size: usize) {
                self.0.borrow_mut().push(depth);
            }
        }
        let monitor = Depths(RefCell::new(Vec::new()));
        let solver: IdpSolver<'_, char, Plan, ()> = IdpSolver::new(&join_step, &cheapest)
            .with_max_table_size(0)
            .with_monitor(&monitor);
        let solution = solver.solve(seed("abcde"), "abcde".chars(), &()).expect("solve");
        let (letters, _) = solution.best.expect("plan");
        assert_eq!(letters.len(), 5);
        // Only pairs complete while more than one triple is pending.
        assert_eq!(*monitor.0.borrow(), vec![2, 2, 3]);
        assert_eq!(solution.iterations, 3);
    }

    #[test]
    fn exhausted_iteration_time_compacts_instead_of_failing() {
        struct Depths(RefCell<Vec<usize>>);
        impl IdpSolverMonitor for Depths {
            fn end_iteration(&self, _iteration: usize, depth: usize, _table_size: usize) {
                self.0.borrow_mut().push(depth);
            }
        }
        let monitor = Depths(RefCell::new(Vec::new()));
        let solver: IdpSolver<'_, char, Plan, ()> = IdpSolver::new(&join_step, &cheapest)
            .with_iteration_duration(Duration::ZERO)
            .with_monitor(&monitor);
        let solution = solver.solve(seed("abcde"), "abcde".chars(), &()).expect("solve");
        let (letters, _) = solution.best.expect("plan");
        assert_eq!(letters.len(), 5);
        assert_eq!(*monitor.0.borrow(), vec![2, 2, 3]);
    }

    #[test]
    fn requirement_fills_sorted_entries() {
        let contains_a = |plan: &Plan| plan.0.contains(&'a');
        let solver: IdpSolver<'_, char, Plan, ()> =
            IdpSolver::new(&join_step, &cheapest).with_requirement(&contains_a);
        let solution = solver.solve(seed("abc"), "abc".chars(), &()).expect("solve");
        assert!(solution.best_sorted.is_some());
    }

    #[test]
    fn empty_generator_reports_missing_block_solution() {
        let nothing = |_: &IdRegistry<char>, _: &Goal, _: &IdpTable<Plan>, _: &()| Vec::<Plan>::new();
        let solver: IdpSolver<'_, char, Plan, ()> = IdpSolver::new(&nothing, &cheapest);
        let err = solver
            .solve(seed("ab"), "ab".chars(), &())
            .expect_err("no candidates");
        assert_eq!(err, PlanningError::NoSolutionForBlock { size: 2 });
    }

    #[test]
    fn single_unit_returns_seed() {
        let solver: IdpSolver<'_, char, Plan, ()> = IdpSolver::new(&join_step, &cheapest);
        let solution = solver.solve(seed("a"), "a".chars(), &()).expect("solve");
        assert_eq!(solution.iterations, 0);
        assert_eq!(solution.best.map(|p| p.1), Some(1));
    }
}

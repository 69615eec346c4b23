//! The dynamic-programming table.

use std::collections::BTreeMap;

use super::registry::Goal;

/// Best known result per `(goal, sorted)` key.
///
/// The `sorted` flag separates the best plan overall (`false`) from the best
/// plan that also fulfils the extra requirement (`true`). Iteration follows
/// key order, which keeps every pass over the table deterministic.
#[derive(Clone, Debug)]
pub struct IdpTable<R> {
    entries: BTreeMap<(Goal, bool), R>,
}

impl<R> Default for IdpTable<R> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<R> IdpTable<R> {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result`, replacing any previous entry for the key.
    pub fn put(&mut self, goal: Goal, sorted: bool, result: R) {
        self.entries.insert((goal, sorted), result);
    }

    /// Entry for the key.
    pub fn get(&self, goal: &Goal, sorted: bool) -> Option<&R> {
        self.entries.get(&(goal.clone(), sorted))
    }

    /// Removes and returns the entry for the key.
    pub fn remove(&mut self, goal: &Goal, sorted: bool) -> Option<R> {
        self.entries.remove(&(goal.clone(), sorted))
    }

    /// True when either key of `goal` is present.
    pub fn contains(&self, goal: &Goal) -> bool {
        self.get(goal, false).is_some() || self.get(goal, true).is_some()
    }

    /// Both entries of `goal`, unsorted first.
    pub fn plans_for<'a>(&'a self, goal: &Goal) -> impl Iterator<Item = &'a R> + 'a {
        let unsorted = self.get(goal, false);
        let sorted = self.get(goal, true);
        unsorted.into_iter().chain(sorted)
    }

    /// Every entry in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Goal, bool, &R)> {
        self.entries
            .iter()
            .map(|((goal, sorted), result)| (goal, *sorted, result))
    }

    /// Unsorted entries whose goal has exactly `size` ids.
    pub fn unsorted_plans_of_size(&self, size: usize) -> impl Iterator<Item = (&Goal, &R)> {
        self.entries
            .iter()
            .filter(move |((goal, sorted), _)| !*sorted && goal.len() == size)
            .map(|((goal, _), result)| (goal, result))
    }

    /// Drops every entry whose goal shares an id with `goal`.
    pub fn remove_all_traces_of(&mut self, goal: &Goal) {
        self.entries.retain(|(key, _), _| !key.intersects(goal));
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

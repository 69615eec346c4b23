//! Solvable registration and goal sets.

use std::collections::BTreeSet;
use std::fmt;

use smallvec::SmallVec;

/// Dense identifier of a registered solvable or of a compacted goal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SolvableId(pub u32);

impl fmt::Display for SolvableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sorted, duplicate-free set of solvable ids.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Goal(SmallVec<[SolvableId; 8]>);

impl Goal {
    /// Empty goal.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Goal holding one id.
    pub fn single(id: SolvableId) -> Self {
        let mut ids = SmallVec::new();
        ids.push(id);
        Self(ids)
    }

    /// Number of ids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty goal.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = SolvableId> + '_ {
        self.0.iter().copied()
    }

    /// Membership test.
    pub fn contains(&self, id: SolvableId) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    /// True when every id of `self` is in `other`.
    pub fn is_subset_of(&self, other: &Goal) -> bool {
        self.iter().all(|id| other.contains(id))
    }

    /// True when the goals share an id.
    pub fn intersects(&self, other: &Goal) -> bool {
        self.iter().any(|id| other.contains(id))
    }

    /// `self` without the ids of `other`.
    pub fn difference(&self, other: &Goal) -> Goal {
        self.iter().filter(|id| !other.contains(*id)).collect()
    }

    /// `self` without `id`.
    pub fn without(&self, id: SolvableId) -> Goal {
        self.iter().filter(|other| *other != id).collect()
    }
}

impl FromIterator<SolvableId> for Goal {
    fn from_iter<I: IntoIterator<Item = SolvableId>>(iter: I) -> Self {
        let mut ids: SmallVec<[SolvableId; 8]> = iter.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, id) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("}")
    }
}

#[derive(Clone, Debug)]
enum Registered<S> {
    Solvable(S),
    Compacted(Goal),
}

/// Maps solvables to ids and remembers what compacted ids stand for.
#[derive(Clone, Debug)]
pub struct IdRegistry<S> {
    entries: Vec<Registered<S>>,
}

impl<S> Default for IdRegistry<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S: Ord + Clone> IdRegistry<S> {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `solvable`, registering it on first sight.
    pub fn register(&mut self, solvable: S) -> SolvableId {
        let existing = self
            .entries
            .iter()
            .position(|entry| matches!(entry, Registered::Solvable(s) if *s == solvable));
        let idx = existing.unwrap_or_else(|| {
            self.entries.push(Registered::Solvable(solvable));
            self.entries.len() - 1
        });
        SolvableId(idx as u32)
    }

    /// Goal of all `solvables`.
    pub fn register_all(&mut self, solvables: impl IntoIterator<Item = S>) -> Goal {
        solvables.into_iter().map(|s| self.register(s)).collect()
    }

    /// Allocates a new id standing for everything in `goal`.
    pub fn compact(&mut self, goal: &Goal) -> SolvableId {
        self.entries.push(Registered::Compacted(goal.clone()));
        SolvableId((self.entries.len() - 1) as u32)
    }

    /// Solvable behind `id`, `None` for compacted or unknown ids.
    pub fn lookup(&self, id: SolvableId) -> Option<&S> {
        match self.entries.get(id.0 as usize) {
            Some(Registered::Solvable(s)) => Some(s),
            _ => None,
        }
    }

    /// True when `id` was produced by [`Self::compact`].
    pub fn is_compacted(&self, id: SolvableId) -> bool {
        matches!(self.entries.get(id.0 as usize), Some(Registered::Compacted(_)))
    }

    /// Original solvables a goal stands for, expanding compacted ids.
    pub fn explode(&self, goal: &Goal) -> BTreeSet<S> {
        let mut out = BTreeSet::new();
        let mut pending: Vec<SolvableId> = goal.iter().collect();
        while let Some(id) = pending.pop() {
            match self.entries.get(id.0 as usize) {
                Some(Registered::Solvable(s)) => {
                    out.insert(s.clone());
                }
                Some(Registered::Compacted(inner)) => pending.extend(inner.iter()),
                None => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_and_goals_are_sorted() {
        let mut registry = IdRegistry::new();
        let b = registry.register("b");
        let a = registry.register("a");
        assert_eq!(registry.register("b"), b);
        let goal: Goal = [a, b, a].into_iter().collect();
        assert_eq!(goal.len(), 2);
        assert_eq!(goal.iter().collect::<Vec<_>>(), vec![b, a]);
    }

    #[test]
    fn compacted_ids_explode_recursively() {
        let mut registry = IdRegistry::new();
        let goal = registry.register_all(["x", "y"]);
        let first = registry.compact(&goal);
        let z = registry.register("z");
        let second = registry.compact(&[first, z].into_iter().collect());
        assert!(registry.is_compacted(second));
        assert!(registry.lookup(second).is_none());
        let exploded: Vec<_> = registry
            .explode(&Goal::single(second))
            .into_iter()
            .collect();
        assert_eq!(exploded, vec!["x", "y", "z"]);
    }
}

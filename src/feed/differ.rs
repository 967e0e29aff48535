//! Snapshot comparison for sources whose upstream returns the complete current state.
//!
//! Two flavours:
//! - whole-state: any structural difference means "changed" (gas tiers, trending list)
//! - list: set difference `current - previous` on normalized entries (earnings calendar)
//!
//! Both state holders route the very first observation through [`DedupSeedGuard`].

use std::collections::HashSet;
use std::hash::Hash;

use crate::feed::seed::DedupSeedGuard;

/// Whole-state comparison. An absent previous snapshot always counts as changed.
pub fn changed<T: PartialEq>(previous: Option<&T>, current: &T) -> bool {
    match previous {
        None => true,
        Some(prev) => prev != current,
    }
}

/// Entries of `current` not present in `previous`, in `current` order, without repeats.
pub fn list_additions<T>(previous: &[T], current: &[T]) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let before: HashSet<&T> = previous.iter().collect();
    let mut emitted: HashSet<&T> = HashSet::new();
    current
        .iter()
        .filter(|e| !before.contains(e) && emitted.insert(*e))
        .cloned()
        .collect()
}

/// Result of feeding a fresh snapshot into [`SnapshotState`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    Seeded,
    Unchanged,
    /// The cache now holds the new snapshot; `previous` is what it replaced.
    Changed { previous: T },
}

/// Cached last snapshot of a whole-state source.
#[derive(Debug, Clone)]
pub struct SnapshotState<T> {
    guard: DedupSeedGuard,
    snapshot: Option<T>,
}

impl<T> Default for SnapshotState<T> {
    fn default() -> Self {
        Self {
            guard: DedupSeedGuard::new(),
            snapshot: None,
        }
    }
}

impl<T: PartialEq + Clone> SnapshotState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&T> {
        self.snapshot.as_ref()
    }

    pub fn observe(&mut self, fresh: T) -> Observation<T> {
        if self.guard.seed_if_first() {
            self.snapshot = Some(fresh);
            return Observation::Seeded;
        }
        if !changed(self.snapshot.as_ref(), &fresh) {
            return Observation::Unchanged;
        }
        match self.snapshot.replace(fresh) {
            Some(previous) => Observation::Changed { previous },
            // Only reachable if the cache was cleared after seeding; treat as a re-seed.
            None => Observation::Seeded,
        }
    }
}

/// Result of feeding a fresh list into [`ListState`].
#[derive(Debug, Clone, PartialEq)]
pub enum ListObservation<T> {
    Seeded { observed: usize },
    Added(Vec<T>),
}

/// Cached last list of a list-diff source.
#[derive(Debug, Clone)]
pub struct ListState<T> {
    guard: DedupSeedGuard,
    previous: Vec<T>,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            guard: DedupSeedGuard::new(),
            previous: Vec::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> ListState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &[T] {
        &self.previous
    }

    pub fn observe(&mut self, fresh: Vec<T>) -> ListObservation<T> {
        if self.guard.seed_if_first() {
            let observed = fresh.len();
            self.previous = fresh;
            return ListObservation::Seeded { observed };
        }
        let added = list_additions(&self.previous, &fresh);
        self.previous = fresh;
        ListObservation::Added(added)
    }
}

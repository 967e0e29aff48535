//! Restart safety: the first successful fetch after boot records a baseline and
//! emits nothing. `SeenSet` tracks dedup keys for sources without a usable cursor.

use std::collections::HashSet;

use crate::feed::types::NotificationItem;

/// Per-source "has the baseline been recorded yet" flag.
#[derive(Debug, Clone, Default)]
pub struct DedupSeedGuard {
    seeded: bool,
}

impl DedupSeedGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seeded(&self) -> bool {
        self.seeded
    }

    /// Returns `true` exactly once, on the call that performs the seeding.
    /// The caller must store the fresh state and suppress output when it does.
    pub fn seed_if_first(&mut self) -> bool {
        if self.seeded {
            return false;
        }
        self.seeded = true;
        true
    }
}

/// Dedup keys already emitted or seeded for one source.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    keys: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Record every key without emitting anything.
    pub fn seed<'a, I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for k in keys {
            self.keys.insert(k.to_string());
        }
    }

    /// Keep only items whose key was never seen (including earlier in this batch),
    /// recording the kept keys. Input order is preserved.
    pub fn retain_unseen(&mut self, items: Vec<NotificationItem>) -> Vec<NotificationItem> {
        items
            .into_iter()
            .filter(|it| self.keys.insert(it.dedup_key.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_fires_once() {
        let mut g = DedupSeedGuard::new();
        assert!(!g.has_seeded());
        assert!(g.seed_if_first());
        assert!(g.has_seeded());
        assert!(!g.seed_if_first());
        assert!(!g.seed_if_first());
    }

    #[test]
    fn retain_unseen_drops_known_and_in_batch_repeats() {
        let mut seen = SeenSet::new();
        seen.seed(["a"]);
        let out = seen.retain_unseen(vec![
            NotificationItem::new("a", 1),
            NotificationItem::new("b", 2),
            NotificationItem::new("b", 3),
            NotificationItem::new("c", 4),
        ]);
        let keys: Vec<_> = out.iter().map(|i| i.dedup_key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(seen.len(), 3);
        assert!(seen.retain_unseen(vec![NotificationItem::new("c", 9)]).is_empty());
    }
}

// src/feed/types.rs
use anyhow::Result;
use std::collections::BTreeMap;

/// One unit of output produced by a fetch cycle.
///
/// `dedup_key` identifies the item across cycles, `ordering_key` (unix millis for
/// time-ordered sources) fixes the emission order within a cycle, and `fields` is the
/// flat map that payload templates render from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationItem {
    pub dedup_key: String,
    pub ordering_key: i64,
    pub fields: BTreeMap<String, String>,
}

impl NotificationItem {
    pub fn new(dedup_key: impl Into<String>, ordering_key: i64) -> Self {
        Self {
            dedup_key: dedup_key.into(),
            ordering_key,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// What one successful poll produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// First successful fetch: state recorded, nothing emitted.
    Seeded { observed: usize },
    /// New items, already in ascending ordering-key order.
    Items(Vec<NotificationItem>),
}

impl CycleOutcome {
    pub fn items(&self) -> &[NotificationItem] {
        match self {
            CycleOutcome::Seeded { .. } => &[],
            CycleOutcome::Items(v) => v,
        }
    }
}

/// An upstream that returns its current state as `T`.
#[async_trait::async_trait]
pub trait SourceProvider<T>: Send + Sync {
    async fn fetch_latest(&self) -> Result<T>;
    fn name(&self) -> &'static str;
}

/// One monitored source: fetch, diff against owned state, return what is new.
///
/// Implementations must leave their state untouched when `poll` fails so the next
/// attempt re-covers the same ground.
#[async_trait::async_trait]
pub trait FeedCycle: Send {
    fn name(&self) -> &str;
    async fn poll(&mut self) -> Result<CycleOutcome>;
}

/// Stable ascending sort by ordering key; ties keep their incoming order.
pub fn sort_chronologically(items: &mut [NotificationItem]) {
    items.sort_by_key(|it| it.ordering_key);
}

// src/feed/providers/trending.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_text, now_millis};
use crate::config::feeds::SourceConfig;
use crate::error::ConfigError;
use crate::feed::differ::{Observation, SnapshotState};
use crate::feed::types::{CycleOutcome, FeedCycle, NotificationItem, SourceProvider};

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TRENDING_ENDPOINT: &str = "https://api.stocktwits.com/api/2/trending/symbols.json";

fn default_endpoint() -> String {
    DEFAULT_TRENDING_ENDPOINT.to_string()
}
fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrendingOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Top N symbols that make up the snapshot.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct TrendingSettings {
    pub options: TrendingOptions,
}

impl TrendingSettings {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        let options: TrendingOptions = cfg.options_as()?;
        if !(1..=100).contains(&options.limit) {
            return Err(ConfigError::options(&cfg.name, "`limit` must be within 1..=100"));
        }
        Ok(Self { options })
    }

    pub fn build(&self, name: &str, http: &reqwest::Client) -> Box<dyn FeedCycle> {
        let provider = TrendingProvider {
            client: http.clone(),
            endpoint: self.options.endpoint.clone(),
            limit: self.options.limit,
        };
        Box::new(TrendingFeed::new(name, Box::new(provider)))
    }
}

#[derive(Debug, Deserialize)]
struct TrendingResponse {
    #[serde(default)]
    symbols: Vec<TrendingSymbol>,
}

#[derive(Debug, Deserialize)]
struct TrendingSymbol {
    symbol: String,
}

/// Ranked, upper-cased symbols, truncated to `limit`. Blank and repeated entries are dropped.
pub fn parse_trending(body: &str, limit: usize) -> Result<Vec<String>> {
    let rsp: TrendingResponse = serde_json::from_str(body).context("parsing trending json")?;
    let mut out: Vec<String> = Vec::with_capacity(limit);
    for s in rsp.symbols {
        let sym = s.symbol.trim().to_ascii_uppercase();
        if sym.is_empty() || out.contains(&sym) {
            continue;
        }
        out.push(sym);
        if out.len() == limit {
            break;
        }
    }
    Ok(out)
}

pub struct TrendingProvider {
    client: reqwest::Client,
    endpoint: String,
    limit: usize,
}

#[async_trait]
impl SourceProvider<Vec<String>> for TrendingProvider {
    async fn fetch_latest(&self) -> Result<Vec<String>> {
        let body = fetch_text(self.client.get(&self.endpoint), "trending symbols").await?;
        parse_trending(&body, self.limit)
    }

    fn name(&self) -> &'static str {
        "trending"
    }
}

pub fn trending_item(current: &[String], previous: &[String]) -> NotificationItem {
    let added: Vec<&str> = current
        .iter()
        .filter(|s| !previous.contains(s))
        .map(String::as_str)
        .collect();
    let removed: Vec<&str> = previous
        .iter()
        .filter(|s| !current.contains(s))
        .map(String::as_str)
        .collect();
    let ranked = current
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");
    let dash = |v: Vec<&str>| if v.is_empty() { "-".to_string() } else { v.join(", ") };

    NotificationItem::new(current.join(","), now_millis())
        .field("symbols", current.join(", "))
        .field("ranked", ranked)
        .field("added", dash(added))
        .field("removed", dash(removed))
}

/// Whole-state source: the full list is re-announced whenever rank or membership changes.
pub struct TrendingFeed {
    name: String,
    provider: Box<dyn SourceProvider<Vec<String>>>,
    state: SnapshotState<Vec<String>>,
}

impl TrendingFeed {
    pub fn new(name: impl Into<String>, provider: Box<dyn SourceProvider<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            provider,
            state: SnapshotState::new(),
        }
    }

    pub fn snapshot(&self) -> Option<&Vec<String>> {
        self.state.current()
    }
}

#[async_trait]
impl FeedCycle for TrendingFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<CycleOutcome> {
        let fresh = self.provider.fetch_latest().await?;
        let observed = fresh.len();
        let outcome = match self.state.observe(fresh) {
            Observation::Seeded => CycleOutcome::Seeded { observed },
            Observation::Unchanged => CycleOutcome::Items(Vec::new()),
            Observation::Changed { previous } => {
                let current = self.state.current().cloned().unwrap_or_default();
                CycleOutcome::Items(vec![trending_item(&current, &previous)])
            }
        };
        Ok(outcome)
    }
}

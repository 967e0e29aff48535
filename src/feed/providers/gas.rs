// src/feed/providers/gas.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_text, now_millis, source_secret};
use crate::config::feeds::SourceConfig;
use crate::error::ConfigError;
use crate::feed::differ::{Observation, SnapshotState};
use crate::feed::types::{CycleOutcome, FeedCycle, NotificationItem, SourceProvider};

pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_GAS_ENDPOINT: &str = "https://api.etherscan.io/v2/api";

fn default_endpoint() -> String {
    DEFAULT_GAS_ENDPOINT.to_string()
}
fn default_chain_id() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GasOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GasSettings {
    pub options: GasOptions,
    pub api_key: Option<String>,
}

impl GasSettings {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        let options: GasOptions = cfg.options_as()?;
        let api_key = options
            .api_key_env
            .as_deref()
            .map(|var| source_secret(&cfg.name, var))
            .transpose()?;
        Ok(Self { options, api_key })
    }

    pub fn build(&self, name: &str, http: &reqwest::Client) -> Box<dyn FeedCycle> {
        let provider = GasOracleProvider {
            client: http.clone(),
            endpoint: self.options.endpoint.clone(),
            chain_id: self.options.chain_id,
            api_key: self.api_key.clone(),
        };
        Box::new(GasPriceFeed::new(name, Box::new(provider)))
    }
}

/// The three price tiers, in gwei.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasTiers {
    pub slow: f64,
    pub average: f64,
    pub fast: f64,
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OracleResult {
    #[serde(rename = "SafeGasPrice")]
    safe: String,
    #[serde(rename = "ProposeGasPrice")]
    propose: String,
    #[serde(rename = "FastGasPrice")]
    fast: String,
}

fn parse_gwei(field: &str, raw: &str) -> Result<f64> {
    let v: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("gas oracle {field}={raw:?} is not a number"))?;
    if !v.is_finite() || v < 0.0 {
        bail!("gas oracle {field}={raw:?} out of range");
    }
    Ok(v)
}

pub fn parse_gas_oracle(body: &str) -> Result<GasTiers> {
    let rsp: OracleResponse = serde_json::from_str(body).context("parsing gas oracle json")?;
    if rsp.status != "1" {
        bail!("gas oracle error: {} ({})", rsp.message, rsp.result);
    }
    let r: OracleResult = serde_json::from_value(rsp.result).context("gas oracle result shape")?;
    Ok(GasTiers {
        slow: parse_gwei("SafeGasPrice", &r.safe)?,
        average: parse_gwei("ProposeGasPrice", &r.propose)?,
        fast: parse_gwei("FastGasPrice", &r.fast)?,
    })
}

pub struct GasOracleProvider {
    client: reqwest::Client,
    endpoint: String,
    chain_id: u64,
    api_key: Option<String>,
}

#[async_trait]
impl SourceProvider<GasTiers> for GasOracleProvider {
    async fn fetch_latest(&self) -> Result<GasTiers> {
        let chain = self.chain_id.to_string();
        let mut params = vec![
            ("chainid", chain.as_str()),
            ("module", "gastracker"),
            ("action", "gasoracle"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            params.push(("apikey", key));
        }
        let body = fetch_text(self.client.get(&self.endpoint).query(&params), "gas oracle").await?;
        parse_gas_oracle(&body)
    }

    fn name(&self) -> &'static str {
        "gas-oracle"
    }
}

/// `10`, `10.5`, `0.25` (at most two decimals, no trailing zeros).
pub fn format_gwei(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn format_delta(d: f64) -> String {
    let body = format_gwei(d.abs());
    if body == "0" {
        body
    } else if d > 0.0 {
        format!("+{body}")
    } else {
        format!("-{body}")
    }
}

pub fn gas_item(current: &GasTiers, previous: &GasTiers) -> NotificationItem {
    let key = format!(
        "{}/{}/{}",
        format_gwei(current.slow),
        format_gwei(current.average),
        format_gwei(current.fast)
    );
    NotificationItem::new(key, now_millis())
        .field("slow", format_gwei(current.slow))
        .field("average", format_gwei(current.average))
        .field("fast", format_gwei(current.fast))
        .field("slow_delta", format_delta(current.slow - previous.slow))
        .field("average_delta", format_delta(current.average - previous.average))
        .field("fast_delta", format_delta(current.fast - previous.fast))
}

/// Whole-state source: one notification whenever any tier changes.
pub struct GasPriceFeed {
    name: String,
    provider: Box<dyn SourceProvider<GasTiers>>,
    state: SnapshotState<GasTiers>,
}

impl GasPriceFeed {
    pub fn new(name: impl Into<String>, provider: Box<dyn SourceProvider<GasTiers>>) -> Self {
        Self {
            name: name.into(),
            provider,
            state: SnapshotState::new(),
        }
    }

    pub fn snapshot(&self) -> Option<&GasTiers> {
        self.state.current()
    }
}

#[async_trait]
impl FeedCycle for GasPriceFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<CycleOutcome> {
        let fresh = self.provider.fetch_latest().await?;
        let outcome = match self.state.observe(fresh) {
            Observation::Seeded => CycleOutcome::Seeded { observed: 1 },
            Observation::Unchanged => CycleOutcome::Items(Vec::new()),
            Observation::Changed { previous } => CycleOutcome::Items(vec![gas_item(&fresh, &previous)]),
        };
        Ok(outcome)
    }
}

// src/feed/providers/mod.rs
//! Upstream adapters. Each module owns its option schema, the HTTP/XML parsing
//! for its upstream, and the `FeedCycle` that diffs that upstream's state.

pub mod earnings;
pub mod gas;
pub mod rss;
pub mod scheduled;
pub mod social;
pub mod trending;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::RequestBuilder;

use crate::config::feeds::SourceConfig;
use crate::error::ConfigError;
use crate::feed::scheduler::Cadence;
use crate::feed::types::FeedCycle;
use crate::notify::template::{EmbedTemplate, PayloadTemplate};

/// Validated, credential-resolved settings for one source.
#[derive(Debug, Clone)]
pub enum SourceSettings {
    Social(social::SocialSettings),
    GasPrice(gas::GasSettings),
    Trending(trending::TrendingSettings),
    Earnings(earnings::EarningsSettings),
    Rss(rss::RssSettings),
    Scheduled(scheduled::ScheduledSettings),
}

impl SourceSettings {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        let settings = match cfg.kind.as_str() {
            "social" => SourceSettings::Social(social::SocialSettings::from_config(cfg)?),
            "gas_price" => SourceSettings::GasPrice(gas::GasSettings::from_config(cfg)?),
            "trending" => SourceSettings::Trending(trending::TrendingSettings::from_config(cfg)?),
            "earnings" => SourceSettings::Earnings(earnings::EarningsSettings::from_config(cfg)?),
            "rss" => SourceSettings::Rss(rss::RssSettings::from_config(cfg)?),
            "scheduled" => SourceSettings::Scheduled(scheduled::ScheduledSettings::from_config(cfg)?),
            other => {
                return Err(ConfigError::UnknownKind {
                    name: cfg.name.clone(),
                    kind: other.to_string(),
                })
            }
        };
        Ok(settings)
    }

    /// Social runs continuously, scheduled posts follow their daily rule, the rest
    /// tick on `interval_secs` (or a per-kind default).
    pub fn cadence(&self, cfg: &SourceConfig) -> Result<Cadence, ConfigError> {
        let default_secs = match self {
            SourceSettings::Social(_) | SourceSettings::Scheduled(_) => {
                if cfg.interval_secs.is_some() {
                    return Err(ConfigError::cadence(
                        &cfg.name,
                        format!("`interval_secs` is not supported for kind `{}`", cfg.kind),
                    ));
                }
                return Ok(match self {
                    SourceSettings::Scheduled(s) => Cadence::Daily(s.rule.clone()),
                    _ => Cadence::Continuous,
                });
            }
            SourceSettings::GasPrice(_) => gas::DEFAULT_INTERVAL_SECS,
            SourceSettings::Trending(_) => trending::DEFAULT_INTERVAL_SECS,
            SourceSettings::Earnings(_) => earnings::DEFAULT_INTERVAL_SECS,
            SourceSettings::Rss(_) => rss::DEFAULT_INTERVAL_SECS,
        };
        match cfg.interval_secs.unwrap_or(default_secs) {
            0 => Err(ConfigError::cadence(&cfg.name, "`interval_secs` must be > 0")),
            secs => Ok(Cadence::Interval(Duration::from_secs(secs))),
        }
    }

    /// Template used when the source entry has no `[sources.template]`.
    pub fn default_template(&self) -> PayloadTemplate {
        match self {
            SourceSettings::Social(_) => PayloadTemplate::text("**@{author}**: {text}\n{url}"),
            SourceSettings::GasPrice(_) => PayloadTemplate::text(
                "Gas (gwei): slow {slow} ({slow_delta}) | avg {average} ({average_delta}) | fast {fast} ({fast_delta})",
            ),
            SourceSettings::Trending(_) => PayloadTemplate {
                content: None,
                embed: Some(EmbedTemplate {
                    title: Some("Trending symbols".into()),
                    description: Some("{ranked}".into()),
                    url: None,
                    footer: Some("added: {added} | removed: {removed}".into()),
                }),
            },
            SourceSettings::Earnings(_) => PayloadTemplate::text(
                "{symbol} {date} ({hour}) [{status}] EPS {eps_actual} vs est. {eps_estimate}, revenue {revenue_actual} vs est. {revenue_estimate}",
            ),
            SourceSettings::Rss(_) => PayloadTemplate {
                content: None,
                embed: Some(EmbedTemplate {
                    title: Some("{title}".into()),
                    description: Some("{summary}".into()),
                    url: Some("{link}".into()),
                    footer: Some("{published}".into()),
                }),
            },
            SourceSettings::Scheduled(_) => PayloadTemplate::text("{weekday} {date} {time} UTC"),
        }
    }

    /// Fresh feed with empty state. Must be called inside the tokio runtime.
    pub fn build(&self, name: &str, http: &reqwest::Client) -> Box<dyn FeedCycle> {
        match self {
            SourceSettings::Social(s) => s.build(name, http),
            SourceSettings::GasPrice(s) => s.build(name, http),
            SourceSettings::Trending(s) => s.build(name, http),
            SourceSettings::Earnings(s) => s.build(name, http),
            SourceSettings::Rss(s) => s.build(name, http),
            SourceSettings::Scheduled(s) => s.build(name),
        }
    }
}

/// Send a GET-style request and return the body of a 2xx response.
pub(crate) async fn fetch_text(req: RequestBuilder, what: &str) -> Result<String> {
    let rsp = req
        .send()
        .await
        .with_context(|| format!("{what} request"))?
        .error_for_status()
        .with_context(|| format!("{what} non-2xx"))?;
    rsp.text().await.with_context(|| format!("{what} .text()"))
}

/// Credential lookup for a source's `*_env` option.
pub(crate) fn source_secret(source: &str, var: &str) -> Result<String, ConfigError> {
    crate::notify::read_secret(source, var)
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// src/feed/providers/scheduled.rs
//! Fixed daily posts. No upstream: each firing of the daily rule yields exactly
//! one item, so there is nothing to seed or diff.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::feeds::SourceConfig;
use crate::error::ConfigError;
use crate::feed::scheduler::DailyRule;
use crate::feed::types::{CycleOutcome, FeedCycle, NotificationItem};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduledOptions {
    /// UTC wall-clock times, `"HH:MM"`.
    pub times: Vec<String>,
    #[serde(default)]
    pub skip_days: Vec<String>,
    /// Static fields merged into every item (template placeholders).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ScheduledSettings {
    pub rule: DailyRule,
    pub fields: BTreeMap<String, String>,
}

const RESERVED_FIELDS: [&str; 3] = ["date", "weekday", "time"];

impl ScheduledSettings {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        let options: ScheduledOptions = cfg.options_as()?;
        let rule = DailyRule::parse(&options.times, &options.skip_days)
            .map_err(|reason| ConfigError::cadence(&cfg.name, reason))?;
        if let Some(k) = options.fields.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            return Err(ConfigError::options(
                &cfg.name,
                format!("field `{k}` is filled in per post and cannot be set statically"),
            ));
        }
        Ok(Self {
            rule,
            fields: options.fields,
        })
    }

    pub fn build(&self, name: &str) -> Box<dyn FeedCycle> {
        Box::new(ScheduledPost::new(name, self.fields.clone()))
    }
}

pub fn scheduled_item(at: DateTime<Utc>, fields: &BTreeMap<String, String>) -> NotificationItem {
    let mut item = NotificationItem::new(at.format("%Y-%m-%dT%H:%M").to_string(), at.timestamp_millis())
        .field("date", at.format("%Y-%m-%d").to_string())
        .field("weekday", at.format("%A").to_string())
        .field("time", at.format("%H:%M").to_string());
    for (k, v) in fields {
        item = item.field(k, v.clone());
    }
    item
}

pub struct ScheduledPost {
    name: String,
    fields: BTreeMap<String, String>,
}

impl ScheduledPost {
    pub fn new(name: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

#[async_trait]
impl FeedCycle for ScheduledPost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<CycleOutcome> {
        Ok(CycleOutcome::Items(vec![scheduled_item(Utc::now(), &self.fields)]))
    }
}

//! # Feed Engine
//! Turns the loaded config into one supervised task per source.
//!
//! Planning is pure (no tasks, no network): every source is validated on its own,
//! so a bad entry yields a `ConfigError` for that source and the rest still start.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::config::feeds::{FeedsConfig, HttpConfig, SourceConfig, TargetConfig};
use crate::error::ConfigError;
use crate::feed::providers::SourceSettings;
use crate::feed::{Cadence, FeedCycle, NotificationDispatcher, Scheduler};
use crate::notify::{build_target, DynTarget};

/// Pause before rebuilding a source whose task panicked.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// A validated source, ready to be built and run.
#[derive(Clone)]
pub struct SourcePlan {
    pub name: String,
    pub cadence: Cadence,
    pub settings: SourceSettings,
    pub dispatcher: NotificationDispatcher,
}

/// Result of planning: runnable sources plus one error per rejected entry.
#[derive(Default)]
pub struct Plan {
    pub sources: Vec<SourcePlan>,
    pub errors: Vec<ConfigError>,
}

impl Plan {
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }
}

fn plan_source(
    cfg: &SourceConfig,
    targets: &BTreeMap<String, DynTarget>,
    broken_targets: &BTreeSet<String>,
) -> Result<SourcePlan, ConfigError> {
    let target = match targets.get(&cfg.target) {
        Some(t) => t.clone(),
        None if broken_targets.contains(&cfg.target) => {
            return Err(ConfigError::UnavailableTarget {
                name: cfg.name.clone(),
                target: cfg.target.clone(),
            })
        }
        None => {
            return Err(ConfigError::UnknownTarget {
                name: cfg.name.clone(),
                target: cfg.target.clone(),
            })
        }
    };

    let settings = SourceSettings::from_config(cfg)?;
    let cadence = settings.cadence(cfg)?;

    let template = match &cfg.template {
        Some(t) if t.is_empty() => {
            return Err(ConfigError::InvalidTemplate {
                name: cfg.name.clone(),
                reason: "template has neither `content` nor `embed`".into(),
            })
        }
        Some(t) => t.clone(),
        None => settings.default_template(),
    };
    template.validate().map_err(|e| ConfigError::InvalidTemplate {
        name: cfg.name.clone(),
        reason: e.to_string(),
    })?;

    Ok(SourcePlan {
        name: cfg.name.clone(),
        cadence,
        settings,
        dispatcher: NotificationDispatcher::new(cfg.name.clone(), target, template),
    })
}

/// Validate targets and sources. Disabled sources are skipped silently; a repeated
/// name keeps the first entry, even when that entry is itself rejected.
pub fn plan(cfg: &FeedsConfig) -> Plan {
    let timeout = Duration::from_secs(cfg.http.timeout_secs);
    let mut out = Plan::default();

    let mut targets = BTreeMap::new();
    let mut broken = BTreeSet::new();
    for (id, table) in &cfg.targets {
        match TargetConfig::from_table(id, table).and_then(|t| build_target(id, &t, timeout)) {
            Ok(t) => {
                targets.insert(id.clone(), t);
            }
            Err(e) => {
                broken.insert(id.clone());
                out.errors.push(e);
            }
        }
    }

    let mut names = HashSet::new();
    for (i, table) in cfg.sources.iter().enumerate() {
        let label = SourceConfig::entry_label(i, table);
        if !names.insert(label.clone()) {
            out.errors.push(ConfigError::DuplicateName(label));
            continue;
        }
        let scfg = match SourceConfig::from_table(i, table) {
            Ok(s) => s,
            Err(e) => {
                out.errors.push(e);
                continue;
            }
        };
        if !scfg.enabled {
            tracing::info!(target: "feed", source = %scfg.name, "source disabled");
            continue;
        }
        match plan_source(&scfg, &targets, &broken) {
            Ok(p) => out.sources.push(p),
            Err(e) => out.errors.push(e),
        }
    }
    out
}

pub fn http_client(cfg: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .user_agent(cfg.user_agent.clone())
        .build()
        .context("building http client")
}

pub struct Engine {
    sources: Vec<SourcePlan>,
    http: reqwest::Client,
}

impl Engine {
    /// Plan every source and log each rejected one. Only a broken HTTP client is fatal.
    pub fn from_config(cfg: &FeedsConfig) -> Result<Self> {
        let http = http_client(&cfg.http)?;
        let plan = plan(cfg);
        for e in &plan.errors {
            tracing::error!(target: "feed", error = %e, "configuration error; skipping");
        }
        tracing::info!(
            target: "feed",
            sources = plan.sources.len(),
            rejected = plan.errors.len(),
            "feed engine planned"
        );
        Ok(Self {
            sources: plan.sources,
            http,
        })
    }

    pub fn sources(&self) -> &[SourcePlan] {
        &self.sources
    }

    /// Spawn one supervised task per source.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        self.sources
            .into_iter()
            .map(|plan| tokio::spawn(supervise(plan, self.http.clone(), RESTART_DELAY)))
            .collect()
    }
}

/// Run a source, rebuilding it from its plan after a panic. State starts empty on
/// every rebuild, so the first cycle afterwards seeds again.
pub async fn supervise(plan: SourcePlan, http: reqwest::Client, restart_delay: Duration) {
    supervise_with(
        &plan.name,
        &plan.cadence,
        &plan.dispatcher,
        restart_delay,
        || plan.settings.build(&plan.name, &http),
    )
    .await
}

/// Supervision loop over any feed factory.
pub async fn supervise_with<F>(
    name: &str,
    cadence: &Cadence,
    dispatcher: &NotificationDispatcher,
    restart_delay: Duration,
    build: F,
) where
    F: Fn() -> Box<dyn FeedCycle>,
{
    let mut restarts = 0u64;
    loop {
        let scheduler = Scheduler::new(build(), cadence.clone(), dispatcher.clone());
        tracing::info!(
            target: "feed",
            source = %name,
            channel = %dispatcher.target_name(),
            restarts,
            "source started"
        );

        match tokio::spawn(scheduler.run()).await {
            Ok(()) => {
                tracing::warn!(target: "feed", source = %name, "source task returned");
                return;
            }
            Err(e) if e.is_panic() => {
                restarts += 1;
                tracing::error!(
                    target: "feed",
                    source = %name,
                    restarts,
                    error = %e,
                    "source task panicked; rebuilding"
                );
                tokio::time::sleep(restart_delay).await;
            }
            Err(e) => {
                tracing::warn!(target: "feed", source = %name, error = %e, "source task cancelled");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_client_builds_from_defaults() {
        assert!(http_client(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn empty_config_plans_nothing() {
        let p = plan(&FeedsConfig::default());
        assert!(p.sources.is_empty());
        assert!(p.errors.is_empty());
    }
}

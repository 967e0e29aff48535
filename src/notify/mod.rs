// src/notify/mod.rs
//! Delivery targets and the payload they carry.

pub mod discord;
pub mod email;
pub mod log;
pub mod slack;
pub mod template;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::feeds::TargetConfig;
use crate::error::ConfigError;

pub use template::{PayloadTemplate, RenderError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

/// A rendered chat message: plain content, an embed, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub content: Option<String>,
    pub embed: Option<Embed>,
}

impl Payload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
        }
    }

    /// Flattened text for targets without rich formatting (Slack, email, logs).
    pub fn plain_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(c) = self.content.as_deref() {
            parts.push(c);
        }
        if let Some(e) = &self.embed {
            parts.extend(
                [&e.title, &e.description, &e.url, &e.footer]
                    .into_iter()
                    .flatten()
                    .map(String::as_str),
            );
        }
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Short subject line: embed title, else first content line.
    pub fn headline(&self) -> String {
        self.embed
            .as_ref()
            .and_then(|e| e.title.clone())
            .or_else(|| {
                self.content
                    .as_deref()
                    .and_then(|c| c.lines().next())
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }
}

/// Handle to a delivered message, usable for a later `edit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub target: String,
    pub message_id: Option<String>,
}

#[async_trait::async_trait]
pub trait DeliveryTarget: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, payload: &Payload) -> Result<DeliveryReceipt>;
    async fn edit(&self, receipt: &DeliveryReceipt, payload: &Payload) -> Result<()>;
}

pub type DynTarget = Arc<dyn DeliveryTarget>;

pub(crate) fn read_secret(target: &str, var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingEnv {
            name: target.to_string(),
            var: var.to_string(),
        }),
    }
}

/// Build a delivery target from its config entry. Credentials are read from env here.
pub fn build_target(id: &str, cfg: &TargetConfig, timeout: Duration) -> Result<DynTarget, ConfigError> {
    let target: DynTarget = match cfg {
        TargetConfig::Discord {
            webhook_url_env,
            max_retries,
        } => {
            let url = read_secret(id, webhook_url_env)?;
            Arc::new(
                discord::DiscordTarget::new(id, url)
                    .with_timeout(timeout)
                    .with_retries(*max_retries),
            )
        }
        TargetConfig::Slack { webhook_url_env } => {
            let url = read_secret(id, webhook_url_env)?;
            Arc::new(slack::SlackTarget::new(id, url).with_timeout(timeout))
        }
        TargetConfig::Email {
            smtp_host,
            username_env,
            password_env,
            from,
            to,
        } => {
            let user = read_secret(id, username_env)?;
            let pass = read_secret(id, password_env)?;
            Arc::new(email::EmailTarget::new(id, smtp_host, user, pass, from, to)?)
        }
        TargetConfig::Log => Arc::new(log::LogTarget::new(id)),
    };
    Ok(target)
}

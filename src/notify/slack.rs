use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{DeliveryReceipt, DeliveryTarget, Payload};

/// Slack incoming webhook. Incoming webhooks cannot edit posted messages.
pub struct SlackTarget {
    name: String,
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackTarget {
    pub fn new(name: impl Into<String>, url: String) -> Self {
        Self {
            name: name.into(),
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl DeliveryTarget for SlackTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: &Payload) -> Result<DeliveryReceipt> {
        let body = serde_json::json!({ "text": payload.plain_text() });

        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(DeliveryReceipt {
            target: self.name.clone(),
            message_id: None,
        })
    }

    async fn edit(&self, _receipt: &DeliveryReceipt, _payload: &Payload) -> Result<()> {
        bail!("slack incoming webhooks cannot edit messages")
    }
}

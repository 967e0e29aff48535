use super::{DeliveryReceipt, DeliveryTarget, Embed, Payload};
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ATTEMPTS: u8 = 8;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 500 ms doubled per failed attempt, capped.
fn backoff(attempt: u8) -> Duration {
    let shift = u32::from(attempt.saturating_sub(1)).min(16);
    Duration::from_millis(500u64 << shift).min(MAX_BACKOFF)
}

/// Discord channel webhook. `send` waits for the created message so it can be edited.
#[derive(Clone)]
pub struct DiscordTarget {
    name: String,
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordTarget {
    pub fn new(name: impl Into<String>, webhook: String) -> Self {
        Self {
            name: name.into(),
            webhook: webhook.trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, MAX_ATTEMPTS);
        self
    }

    fn message_url(&self, id: &str) -> String {
        format!("{}/messages/{}", self.webhook, id)
    }

    /// Retry transport errors and non-2xx responses with exponential backoff.
    async fn execute<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = build().timeout(self.timeout).send().await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(backoff(attempt)).await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(rsp);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl DeliveryTarget for DiscordTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: &Payload) -> Result<DeliveryReceipt> {
        let body = DiscordWebhookPayload::from(payload);
        let rsp = self
            .execute(|| {
                self.client
                    .request(Method::POST, &self.webhook)
                    .query(&[("wait", "true")])
                    .json(&body)
            })
            .await?;
        let msg: DiscordMessage = rsp.json().await.context("decode Discord message")?;
        Ok(DeliveryReceipt {
            target: self.name.clone(),
            message_id: Some(msg.id),
        })
    }

    async fn edit(&self, receipt: &DeliveryReceipt, payload: &Payload) -> Result<()> {
        let id = receipt
            .message_id
            .as_deref()
            .ok_or_else(|| anyhow!("receipt has no Discord message id"))?;
        let url = self.message_url(id);
        let body = DiscordWebhookPayload::from(payload);
        self.execute(|| self.client.request(Method::PATCH, &url).json(&body))
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct DiscordMessage {
    id: String,
}

#[derive(Serialize)]
struct DiscordEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordFooter>,
}

#[derive(Serialize)]
struct DiscordFooter {
    text: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl From<&Payload> for DiscordWebhookPayload {
    fn from(p: &Payload) -> Self {
        let embeds = p
            .embed
            .iter()
            .map(|e: &Embed| DiscordEmbed {
                title: e.title.clone(),
                description: e.description.clone(),
                url: e.url.clone(),
                footer: e.footer.clone().map(|text| DiscordFooter { text }),
            })
            .collect();
        Self {
            content: p.content.clone(),
            embeds,
        }
    }
}

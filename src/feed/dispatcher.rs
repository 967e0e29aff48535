// src/feed/dispatcher.rs
//! Render new items through a source's template and deliver them one by one.

use std::sync::Arc;

use anyhow::Result;
use metrics::counter;

use crate::feed::key_digest;
use crate::feed::types::NotificationItem;
use crate::notify::{DeliveryReceipt, DeliveryTarget, PayloadTemplate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    source: String,
    target: Arc<dyn DeliveryTarget>,
    template: PayloadTemplate,
}

impl NotificationDispatcher {
    pub fn new(source: impl Into<String>, target: Arc<dyn DeliveryTarget>, template: PayloadTemplate) -> Self {
        Self {
            source: source.into(),
            target,
            template,
        }
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    /// Render one item and send it.
    pub async fn deliver(&self, item: &NotificationItem) -> Result<DeliveryReceipt> {
        let payload = self.template.render(&item.fields)?;
        self.target.send(&payload).await
    }

    /// Deliver sequentially in the given order. A failed item is logged and skipped.
    pub async fn deliver_all(&self, items: &[NotificationItem]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for item in items {
            match self.deliver(item).await {
                Ok(receipt) => {
                    report.delivered += 1;
                    counter!("feed_deliveries_total", "source" => self.source.clone(), "outcome" => "ok")
                        .increment(1);
                    tracing::info!(
                        target: "feed",
                        source = %self.source,
                        channel = %self.target.name(),
                        item = %key_digest(&item.dedup_key),
                        message_id = receipt.message_id.as_deref().unwrap_or("-"),
                        "notification delivered"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("feed_deliveries_total", "source" => self.source.clone(), "outcome" => "error")
                        .increment(1);
                    tracing::warn!(
                        target: "feed",
                        source = %self.source,
                        channel = %self.target.name(),
                        item = %key_digest(&item.dedup_key),
                        error = %format!("{e:#}"),
                        "notification delivery failed"
                    );
                }
            }
        }
        report
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;

use super::{DeliveryReceipt, DeliveryTarget, Payload};

/// Dry-run target: writes rendered payloads to the log.
pub struct LogTarget {
    name: String,
    seq: AtomicU64,
}

impl LogTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seq: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl DeliveryTarget for LogTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: &Payload) -> Result<DeliveryReceipt> {
        let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(target: "notify", channel = %self.name, id, text = %payload.plain_text(), "send");
        Ok(DeliveryReceipt {
            target: self.name.clone(),
            message_id: Some(id.to_string()),
        })
    }

    async fn edit(&self, receipt: &DeliveryReceipt, payload: &Payload) -> Result<()> {
        tracing::info!(
            target: "notify",
            channel = %self.name,
            id = receipt.message_id.as_deref().unwrap_or("-"),
            text = %payload.plain_text(),
            "edit"
        );
        Ok(())
    }
}

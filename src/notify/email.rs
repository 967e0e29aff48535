use anyhow::{bail, Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{DeliveryReceipt, DeliveryTarget, Payload};
use crate::error::ConfigError;

pub struct EmailTarget {
    name: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailTarget {
    pub fn new(name: &str, host: &str, user: String, pass: String, from: &str, to: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTarget {
            name: name.to_string(),
            reason,
        };

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| invalid(format!("invalid smtp_host {host:?}: {e}")))?
            .credentials(creds)
            .build();

        let from = from
            .parse::<Mailbox>()
            .map_err(|e| invalid(format!("invalid from address: {e}")))?;
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| invalid(format!("invalid to address: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            mailer,
            from,
            to,
        })
    }
}

#[async_trait::async_trait]
impl DeliveryTarget for EmailTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: &Payload) -> Result<DeliveryReceipt> {
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(payload.headline())
            .header(header::ContentType::TEXT_PLAIN)
            .body(payload.plain_text())
            .context("build email")?;

        let rsp = self.mailer.send(msg).await.context("send email")?;
        let message_id = rsp.message().next().map(str::to_string);
        Ok(DeliveryReceipt {
            target: self.name.clone(),
            message_id,
        })
    }

    async fn edit(&self, _receipt: &DeliveryReceipt, _payload: &Payload) -> Result<()> {
        bail!("sent email cannot be edited")
    }
}

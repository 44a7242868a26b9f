use async_trait::async_trait;
use tracing::info;

use crate::error::MailError;
use crate::types::{EmailMessage, SendReceipt};

/// Outbound email transport.
///
/// Implementations must be `Send + Sync` so one instance can be shared by every
/// job through an `Arc<dyn Mailer>`.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"http"`).
    fn name(&self) -> &str;

    /// Deliver a single message. Failures are reported, never retried here.
    async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailError>;
}

/// Transport used when no mail API is configured: logs the envelope and drops the body.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            tag = message.tag.as_deref().unwrap_or(""),
            "mail transport not configured; message logged only"
        );
        Ok(SendReceipt::default())
    }
}

use agency_core::config::MailConfig;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::MailError;
use crate::mailer::Mailer;
use crate::types::{EmailMessage, SendReceipt};

/// Delivers mail through a JSON transactional-mail API
/// (`POST {api_url}` with a bearer key, Resend-style body).
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Debug, Deserialize)]
struct ApiAccepted {
    id: Option<String>,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from,
        }
    }

    /// Build from config. Fails when the API URL or key is missing.
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let api_url = config
            .api_url
            .clone()
            .ok_or_else(|| MailError::ConfigError("mail.api_url is not set".into()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| MailError::ConfigError("mail.api_key is not set".into()))?;
        Ok(Self::new(api_url, api_key, config.from.clone()))
    }

    fn request_body(&self, message: &EmailMessage) -> serde_json::Value {
        let mut body = serde_json::json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
        });
        if let Some(ref tag) = message.tag {
            body["tags"] = serde_json::json!([{ "name": "category", "value": tag }]);
        }
        body
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailError> {
        debug!(to = %message.to, subject = %message.subject, "sending email");

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(message))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(MailError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MailError::Api { status, message });
        }

        // Providers differ in what they return; an unreadable body still means accepted.
        let accepted = resp.json::<ApiAccepted>().await.ok();
        Ok(SendReceipt {
            id: accepted.and_then(|a| a.id),
        })
    }
}

use serde::{Deserialize, Serialize};

/// A rendered email ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Plain-text alternative body.
    pub text: String,
    /// Free-form tag forwarded to the provider for analytics, e.g. "daily_digest".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Provider acknowledgement for an accepted message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Provider-assigned message id, when the API returns one.
    pub id: Option<String>,
}

use agency_core::AgencyError;
use thiserror::Error;

/// Errors that can occur while handing a message to the mail transport.
#[derive(Debug, Error)]
pub enum MailError {
    /// The HTTP request never reached the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Mail API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider throttled the request.
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The mail configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<MailError> for AgencyError {
    fn from(e: MailError) -> Self {
        AgencyError::Mail(e.to_string())
    }
}

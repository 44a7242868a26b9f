//! `agency-mail`: outbound email transport for scheduled notifications.

pub mod error;
pub mod http;
pub mod mailer;
pub mod types;

pub use error::MailError;
pub use http::HttpMailer;
pub use mailer::{LogMailer, Mailer};
pub use types::{EmailMessage, SendReceipt};

//! Transactional email
//!
//! [`EmailSender`] is the seam business code depends on; [`SesMailer`] sends
//! through Amazon SES.

pub mod ses;
pub mod sigv4;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

pub use ses::SesMailer;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail service error ({status}): {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("Mail service response carried no message id")]
    MissingMessageId,

    #[error("Invalid mail service endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Sends a single HTML email from a fixed sender address
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Returns the provider's message id
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<String, EmailError>;
}

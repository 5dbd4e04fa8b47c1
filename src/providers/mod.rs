//! Generative-text providers

pub mod gemini;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

pub use gemini::GeminiClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream error ({status}): {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("Upstream returned no text")]
    EmptyResponse,
}

/// Produces text for a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

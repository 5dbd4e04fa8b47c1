use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::{
    config::GeminiConfig,
    models::gemini::{GenerateContentRequest, GenerateContentResponse},
};

use super::{ProviderError, TextGenerator};

/// Client for the Gemini Generate Content API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: String, base_url: String, model: String, timeout: Duration) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
        }
    }

    /// Build a client when an API key is configured
    pub fn from_config(client: Client, config: &GeminiConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self::new(
            client,
            api_key,
            config.base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_seconds),
        ))
    }

    /// Call Gemini Generate Content API
    /// Note: Model name is part of the URL path
    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProviderError> {
        // Gemini API format: /v1beta/models/{model}:generateContent
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .query(&[("key", &self.api_key)])
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Upstream { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateContentRequest::from_prompt(prompt);
        let response = self.generate_content(&request).await?;

        let usage = response.usage_metadata.as_ref();
        tracing::debug!(
            model = %self.model,
            model_version = response.model_version.as_deref().unwrap_or("unknown"),
            prompt_tokens = usage.map(|u| u.prompt_token_count),
            output_tokens = usage.map(|u| u.candidates_token_count),
            total_tokens = usage.map(|u| u.total_token_count),
            "Gemini generation completed"
        );

        response.text().ok_or(ProviderError::EmptyResponse)
    }
}

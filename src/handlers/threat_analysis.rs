use axum::{body::Bytes, extract::State, response::Json};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::{error::AppError, providers::TextGenerator};

pub const MISSING_API_KEY: &str = "GEMINI_API_KEY not set.";
pub const MISSING_USER_INPUT: &str = "Missing userInput.";
pub const ANALYSIS_FAILED: &str = "Failed to generate threat analysis.";

/// State shared by the business routes
#[derive(Clone, Default)]
pub struct AppState {
    /// `None` when no Gemini API key is configured
    pub generator: Option<Arc<dyn TextGenerator>>,
}

#[derive(Debug, Serialize)]
pub struct ThreatAnalysisResponse {
    pub analysis: String,
}

/// Prompt sent to the language model with the user's situation embedded
pub fn build_prompt(user_input: &str) -> String {
    format!(
        r#"
You are a world-class financial privacy and sovereignty expert writing copy for the obligato.io landing page. Your tone is authoritative, direct, and designed to create a sense of urgency.

A user has described their financial situation. Your task is to analyze their potential exposure to three core threats:
1. **Financial Surveillance:** (Mention risks like the Travel Rule, automatic reporting, and how their assets might be tracked).
2. **Systemic Risk:** (Mention risks like fiat debasement, central points of failure, and institutional fragility).
3. **Lack of True Ownership:** (Mention how their assets are liabilities on someone else's balance sheet).

User's situation:
"{user_input}"

Based on this, generate a concise "Personalized Threat Report". The report should be 2-3 short paragraphs. Use strong, punchy language. Start with a direct headline like "**ANALYSIS: Your Exposure Profile**". Do not offer a solution, only agitate the problem. Use markdown for bolding (**text**) and bullet points (* item).
"#
    )
}

/// Extract `userInput` from a JSON body
///
/// Absent, `null`, `false`, `0` and `""` all count as missing, as does a body
/// that is empty or not a JSON object. Other non-string values are embedded in
/// their JSON form.
pub fn extract_user_input(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("userInput")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::String(_) | Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// POST /threat-analysis
///
/// The credential is checked before the body, so a missing key is reported
/// even for invalid requests.
pub async fn handle_threat_analysis(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ThreatAnalysisResponse>, AppError> {
    let generator = state
        .generator
        .as_ref()
        .ok_or_else(|| AppError::Configuration(MISSING_API_KEY.to_string()))?;

    let user_input = extract_user_input(&body)
        .ok_or_else(|| AppError::Validation(MISSING_USER_INPUT.to_string()))?;

    tracing::debug!(input_len = user_input.len(), "Generating threat analysis");

    let analysis = generator
        .generate(&build_prompt(&user_input))
        .await
        .map_err(|source| AppError::Downstream {
            message: ANALYSIS_FAILED,
            source,
        })?;

    Ok(Json(ThreatAnalysisResponse { analysis }))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::providers::ProviderError;

/// Errors returned by route handlers
#[derive(Debug, Error)]
pub enum AppError {
    /// A required credential or setting is missing
    #[error("{0}")]
    Configuration(String),

    /// The request is missing a required field
    #[error("{0}")]
    Validation(String),

    /// A third-party call failed; only `message` reaches the caller
    #[error("{message}")]
    Downstream {
        message: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("Not Found")]
    NotFound,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Downstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::NotFound => (status, "Not Found").into_response(),
            Self::Downstream { message, source } => {
                tracing::error!(error = %source, "Downstream call failed");
                (status, Json(json!({ "error": message }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

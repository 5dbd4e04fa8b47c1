use crate::error::AppError;

pub const GREETING: &str = "Hello from Obligato Server!";

/// GET / - plain-text greeting
pub async fn greeting() -> &'static str {
    tracing::info!(message = GREETING);
    GREETING
}

/// Catch-all for unmatched routes
pub async fn not_found() -> AppError {
    AppError::NotFound
}

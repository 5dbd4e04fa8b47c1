//! Structured logging.
//!
//! One process-wide `tracing` subscriber, plus a request span per inbound
//! request so every event emitted while handling it carries the request id,
//! method, path and final status.

use axum::http::{HeaderName, Request, Response};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{MakeSpan, OnResponse, TraceLayer};
use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Environment;

/// Inbound correlation header reused as the request id when present
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Default filter directive for an environment
pub fn default_level(environment: Environment) -> &'static str {
    match environment {
        Environment::Production => "info",
        Environment::Development => "debug",
    }
}

/// Initialize tracing/logging
///
/// `RUST_LOG` wins when set. Production writes JSON lines, development writes
/// human-readable lines. Can only be called once per process.
pub fn init_tracing(environment: Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(environment)));

    let registry = tracing_subscriber::registry().with(filter);
    match environment {
        Environment::Production => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .init(),
        Environment::Development => registry.with(fmt::layer().with_target(true)).init(),
    }
}

/// Creates the per-request span
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        tracing::info_span!(
            "request",
            id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
            status = tracing::field::Empty,
        )
    }
}

/// Records the status on the request span and logs completion
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCompletion;

impl<B> OnResponse<B> for RequestCompletion {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        span.record("status", response.status().as_u16());
        tracing::info!(
            response_time_ms = latency.as_secs_f64() * 1000.0,
            "request completed"
        );
    }
}

/// Layer attaching the request span to every timed route
pub fn request_logging_layer(
) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan, tower_http::trace::DefaultOnRequest, RequestCompletion>
{
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_response(RequestCompletion)
}

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

use crate::{
    config::Config,
    handlers::{self, threat_analysis::AppState},
    metrics::MetricRegistry,
    observability::{request_logging_layer, track_request_duration, RequestTimer},
    providers::{GeminiClient, TextGenerator},
    signals::shutdown_signal,
};

/// Maximum accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Start the server
///
/// This function:
/// 1. Builds the metric registry (process gauges + request histogram)
/// 2. Wires the generative-text client if a key is configured
/// 3. Binds to the configured address
/// 4. Serves requests until SIGINT/SIGTERM, then drains
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let registry = Arc::new(MetricRegistry::new());
    registry.collect_defaults()?;
    let request_timer = RequestTimer::register(&registry)?;

    let http_client = reqwest::Client::new();
    let generator = GeminiClient::from_config(http_client, &config.gemini)
        .map(|client| Arc::new(client) as Arc<dyn TextGenerator>);
    if generator.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; /threat-analysis will return 500");
    }

    let app = create_router(registry, request_timer, AppState { generator });

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        address = %listener.local_addr()?,
        environment = config.server.environment.as_str(),
        "App started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Create the Axum router
///
/// Admin routes are merged in untouched, so a GET to them is neither timed nor
/// logged. Everything else passes the timer first, then the request logger.
/// A wrong method on any known path gets the same timed 404 as an unknown path.
pub fn create_router(
    registry: Arc<MetricRegistry>,
    request_timer: RequestTimer,
    app_state: AppState,
) -> Router {
    let timed_not_found = observed(
        Router::new().fallback(handlers::root::not_found),
        request_timer.clone(),
    );

    let timed_routes = observed(
        Router::new()
            .route(
                "/",
                get(handlers::root::greeting).fallback(handlers::root::not_found),
            )
            .route(
                "/threat-analysis",
                post(handlers::threat_analysis::handle_threat_analysis)
                    .fallback(handlers::root::not_found),
            )
            .fallback(handlers::root::not_found)
            .with_state(app_state),
        request_timer,
    );

    Router::new()
        .route(
            "/ready",
            get(handlers::health::readiness_check).fallback_service(timed_not_found.clone()),
        )
        .route(
            "/live",
            get(handlers::health::liveness_check).fallback_service(timed_not_found.clone()),
        )
        .route(
            "/metrics",
            get(handlers::metrics_handler::metrics).fallback_service(timed_not_found),
        )
        .with_state(registry)
        .merge(timed_routes)
}

/// Wrap `router` in the body limit, request logging and request timing layers
fn observed(router: Router, request_timer: RequestTimer) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(request_logging_layer())
        .layer(middleware::from_fn_with_state(
            request_timer,
            track_request_duration,
        ))
}

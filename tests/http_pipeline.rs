//! End-to-end tests for the HTTP pipeline: routing, request timing and metric exposition

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use obligato_server::{
    handlers::threat_analysis::{AppState, ANALYSIS_FAILED, MISSING_API_KEY, MISSING_USER_INPUT},
    metrics::MetricRegistry,
    observability::RequestTimer,
    providers::{ProviderError, TextGenerator},
    server::create_router,
};
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tower::ServiceExt;

/// Generator returning a fixed reply and counting calls
struct MockGenerator {
    reply: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockGenerator {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Generator that never answers, standing in for a client that hangs up first
struct StalledGenerator {
    started: tokio::sync::Notify,
}

#[async_trait]
impl TextGenerator for StalledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.started.notify_one();
        std::future::pending().await
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(prompt.contains("User's situation:"));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().ok_or(ProviderError::EmptyResponse)
    }
}

struct TestApp {
    router: Router,
    registry: Arc<MetricRegistry>,
    timer: RequestTimer,
}

impl TestApp {
    fn new(generator: Option<Arc<MockGenerator>>) -> Self {
        Self::with_state(AppState {
            generator: generator.map(|g| g as Arc<dyn TextGenerator>),
        })
    }

    fn with_state(state: AppState) -> Self {
        let registry = Arc::new(MetricRegistry::new());
        let timer = RequestTimer::register(&registry).unwrap();

        Self {
            router: create_router(registry.clone(), timer.clone(), state),
            registry,
            timer,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: &str) -> (StatusCode, String) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    fn count(&self, code: &str, handler: &str, method: &str) -> u64 {
        self.timer
            .histogram()
            .snapshot(&[("code", code), ("handler", handler), ("method", method)])
            .map(|s| s.count)
            .unwrap_or(0)
    }
}

#[tokio::test]
async fn test_greeting_is_timed_once() {
    let app = TestApp::new(None);

    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello from Obligato Server!");

    assert_eq!(app.count("200", "/", "GET"), 1);
    assert_eq!(app.timer.histogram().observation_count(), 1);
}

#[tokio::test]
async fn test_admin_routes_are_not_timed() {
    let app = TestApp::new(None);

    let (status, body) = app.get("/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"status": "ok"}));

    let (status, _) = app.get("/ready").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.timer.histogram().observation_count(), 0);
}

#[tokio::test]
async fn test_unmatched_route_returns_404_with_wildcard_handler() {
    let app = TestApp::new(None);

    let (status, body) = app.get("/does/not/exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");

    let (status, _) = app.get("/another-miss").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Raw paths never become label values
    assert_eq!(app.count("404", "*", "GET"), 2);
    assert!(!app.registry.exposition().unwrap().contains("/does/not/exist"));
}

#[tokio::test]
async fn test_threat_analysis_success() {
    let generator = MockGenerator::replying("**ANALYSIS: Your Exposure Profile**");
    let app = TestApp::new(Some(generator.clone()));

    let (status, body) = app
        .post_json("/threat-analysis", r#"{"userInput":"All my savings sit in one bank"}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"analysis": "**ANALYSIS: Your Exposure Profile**"})
    );
    assert_eq!(generator.calls(), 1);
    assert_eq!(app.count("200", "/threat-analysis", "POST"), 1);
}

#[tokio::test]
async fn test_threat_analysis_missing_input() {
    let generator = MockGenerator::replying("unused");
    let app = TestApp::new(Some(generator.clone()));

    for body in ["", "{}", r#"{"userInput":""}"#, r#"{"other":"field"}"#] {
        let (status, response) = app.post_json("/threat-analysis", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(
            serde_json::from_str::<Value>(&response).unwrap(),
            json!({"error": MISSING_USER_INPUT})
        );
    }

    assert_eq!(generator.calls(), 0);
    assert_eq!(app.count("400", "/threat-analysis", "POST"), 4);
}

#[tokio::test]
async fn test_threat_analysis_without_credential() {
    let app = TestApp::new(None);

    // The credential check runs before input validation
    for body in [r#"{"userInput":"anything"}"#, "{}"] {
        let (status, response) = app.post_json("/threat-analysis", body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::from_str::<Value>(&response).unwrap(),
            json!({"error": MISSING_API_KEY})
        );
    }

    assert_eq!(app.count("500", "/threat-analysis", "POST"), 2);
}

#[tokio::test]
async fn test_threat_analysis_downstream_failure_is_generic() {
    let generator = MockGenerator::failing();
    let app = TestApp::new(Some(generator.clone()));

    let (status, body) = app
        .post_json("/threat-analysis", r#"{"userInput":"I use a custodial wallet"}"#)
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"error": ANALYSIS_FAILED})
    );
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_timed_window_covers_handler() {
    let generator = Arc::new(MockGenerator {
        reply: Some("ok".to_string()),
        delay: Duration::from_millis(30),
        calls: AtomicUsize::new(0),
    });
    let app = TestApp::new(Some(generator));

    let (status, _) = app
        .post_json("/threat-analysis", r#"{"userInput":"slow path"}"#)
        .await;
    assert_eq!(status, StatusCode::OK);

    let snapshot = app
        .timer
        .histogram()
        .snapshot(&[("code", "200"), ("handler", "/threat-analysis"), ("method", "POST")])
        .unwrap();
    assert_eq!(snapshot.count, 1);
    assert!(snapshot.sum_seconds >= 0.03, "sum was {}", snapshot.sum_seconds);

    // 30ms lands above the 25ms bound and inside the 50ms one
    let bucket = |bound: f64| {
        snapshot
            .buckets
            .iter()
            .find(|(b, _)| (*b - bound).abs() < f64::EPSILON)
            .map(|(_, c)| *c)
            .unwrap()
    };
    assert_eq!(bucket(0.005), 0);
    assert_eq!(bucket(0.025), 0);
    assert_eq!(bucket(5.0), 1);
}

#[tokio::test]
async fn test_buckets_are_cumulative() {
    let app = TestApp::new(None);

    for _ in 0..3 {
        app.get("/").await;
    }

    let snapshot = app
        .timer
        .histogram()
        .snapshot(&[("code", "200"), ("handler", "/"), ("method", "GET")])
        .unwrap();
    assert_eq!(snapshot.count, 3);

    let counts: Vec<u64> = snapshot.buckets.iter().map(|(_, c)| *c).collect();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(counts.last().copied(), Some(3));
}

#[tokio::test]
async fn test_metrics_exposition_is_parseable() {
    let app = TestApp::new(None);
    app.registry.collect_defaults().unwrap();

    app.get("/").await;
    app.get("/missing").await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    // HELP and TYPE appear once per family, before its samples
    assert_eq!(
        text.matches("# HELP http_request_duration_seconds ").count(),
        1
    );
    assert_eq!(
        text.matches("# TYPE http_request_duration_seconds histogram").count(),
        1
    );
    assert!(text.contains("le=\"+Inf\""));
    assert!(text.contains("obligato_server_info"));

    let lines = text.lines().map(|l| Ok::<_, std::io::Error>(l.to_string()));
    let scrape = prometheus_parse::Scrape::parse(lines).unwrap();
    assert!(scrape.docs.contains_key("http_request_duration_seconds"));

    let handlers: Vec<&str> = scrape
        .samples
        .iter()
        .filter(|s| s.metric.starts_with("http_request_duration_seconds"))
        .filter_map(|s| s.labels.get("handler"))
        .collect();
    assert!(handlers.contains(&"/"));
    assert!(handlers.contains(&"*"));
}

#[tokio::test]
async fn test_registries_are_isolated() {
    let first = TestApp::new(None);
    let second = TestApp::new(None);

    first.get("/").await;

    assert_eq!(first.timer.histogram().observation_count(), 1);
    assert_eq!(second.timer.histogram().observation_count(), 0);
}

#[tokio::test]
async fn test_wrong_method_on_timed_route_is_404() {
    let app = TestApp::new(Some(MockGenerator::replying("unused")));

    let (status, body) = app.get("/threat-analysis").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");

    let (status, body) = app.post_json("/", "{}").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");

    assert_eq!(app.count("404", "/threat-analysis", "GET"), 1);
    assert_eq!(app.count("404", "/", "POST"), 1);
    assert_eq!(app.timer.histogram().observation_count(), 2);
}

#[tokio::test]
async fn test_wrong_method_on_admin_route_is_timed_404() {
    let app = TestApp::new(None);

    for uri in ["/ready", "/live", "/metrics"] {
        let (status, body) = app.post_json(uri, "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "uri {}", uri);
        assert_eq!(body, "Not Found");
    }

    // Only the wrong-method requests are timed, one observation each
    assert_eq!(app.timer.histogram().observation_count(), 3);

    let (status, _) = app.get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.timer.histogram().observation_count(), 3);
}

#[tokio::test]
async fn test_abandoned_request_is_recorded_once_as_499() {
    let generator = Arc::new(StalledGenerator {
        started: tokio::sync::Notify::new(),
    });
    let app = TestApp::with_state(AppState {
        generator: Some(generator.clone() as Arc<dyn TextGenerator>),
    });

    let request = Request::builder()
        .method("POST")
        .uri("/threat-analysis")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"userInput":"the client will hang up"}"#))
        .unwrap();
    let in_flight = app.router.clone().oneshot(request);

    // Drive the request until the handler is parked, then abandon it
    tokio::select! {
        _ = in_flight => panic!("stalled request produced a response"),
        _ = generator.started.notified() => {}
    }

    assert_eq!(app.count("499", "/threat-analysis", "POST"), 1);
    assert_eq!(app.timer.histogram().observation_count(), 1);
}

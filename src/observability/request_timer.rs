//! Per-request latency timing.
//!
//! Every request passing through this middleware produces exactly one
//! observation in `http_request_duration_seconds`, labeled by method, route
//! template and status code.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::metrics::{DurationHistogram, MetricRegistry, MetricsError, Timer};

pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Bucket upper bounds in seconds (5ms .. 5s)
pub const HTTP_REQUEST_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Handler label for requests no route matched
pub const UNMATCHED_HANDLER: &str = "*";

/// Status label recorded when the client goes away before a response exists
pub const ABORTED_STATUS: &str = "499";

/// Histogram handle shared by the timing middleware
#[derive(Clone)]
pub struct RequestTimer {
    histogram: DurationHistogram,
}

impl RequestTimer {
    /// Create the request histogram and register it with `registry`
    pub fn register(registry: &MetricRegistry) -> Result<Self, MetricsError> {
        let histogram = DurationHistogram::new(
            HTTP_REQUEST_DURATION,
            "Duration of HTTP requests in seconds",
            &["code", "handler", "method"],
            HTTP_REQUEST_BUCKETS.to_vec(),
        )?;
        registry.register(histogram.clone())?;

        Ok(Self { histogram })
    }

    pub fn histogram(&self) -> &DurationHistogram {
        &self.histogram
    }
}

/// Route template for the request, never the raw URL
fn handler_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_HANDLER.to_string())
}

/// A timing measurement owned by one request
///
/// `timer` is `Some` while timing and taken on the terminal event, so the
/// observation is recorded at most once whichever way the request ends.
struct InFlight {
    timer: Option<Timer>,
}

impl InFlight {
    fn finish(&mut self, code: &str) {
        let Some(mut timer) = self.timer.take() else {
            return;
        };
        if let Err(e) = timer.stop(&[("code", code)]) {
            tracing::warn!(error = %e, "Failed to record request duration");
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.timer.is_some() {
            tracing::debug!("Request aborted before a response was produced");
            self.finish(ABORTED_STATUS);
        }
    }
}

/// Middleware timing every request that reaches it
///
/// Failures to start or stop the timer are logged and never affect the response.
pub async fn track_request_duration(
    State(timer): State<RequestTimer>,
    request: Request,
    next: Next,
) -> Response {
    let handler = handler_label(&request);
    let method = request.method().as_str().to_owned();

    let mut in_flight = InFlight {
        timer: match timer
            .histogram
            .start_timer(&[("method", method.as_str()), ("handler", handler.as_str())])
        {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start request timer");
                None
            }
        },
    };

    let response = next.run(request).await;
    in_flight.finish(response.status().as_str());

    response
}

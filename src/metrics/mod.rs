//! Prometheus metrics for the HTTP boundary
//!
//! - `registry`: the injected [`MetricRegistry`] rendering the `/metrics` scrape
//! - `histogram`: [`DurationHistogram`] and its start/stop [`Timer`]

pub mod histogram;
pub mod registry;

pub use histogram::{DurationHistogram, HistogramSnapshot, Timer};
pub use registry::MetricRegistry;

use thiserror::Error;

/// Errors raised by the metrics subsystem
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric with this name is already registered
    #[error("metric '{0}' is already registered")]
    DuplicateName(String),

    /// Supplied label keys do not fit the instrument's declared schema
    #[error("labels [{found}] do not match schema [{expected}]")]
    LabelSchemaMismatch { expected: String, found: String },

    /// `stop` was called on a timer that already recorded its observation
    #[error("timer already stopped")]
    TimerAlreadyStopped,

    /// Bucket bounds must be non-empty, finite and strictly increasing
    #[error("invalid histogram buckets: {0}")]
    InvalidBuckets(String),

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("exposition is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

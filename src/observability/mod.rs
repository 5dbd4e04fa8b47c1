//! Observability subsystem
//!
//! ```text
//! request → request_timer (starts timer)
//!         → logging (request span, completion event)
//!         → handler
//!         ← response: span records status, timer records observation
//! ```
//!
//! Logging sits inside the timed window, so its overhead is part of the
//! recorded latency.

pub mod logging;
pub mod request_timer;

pub use logging::{init_tracing, request_logging_layer};
pub use request_timer::{track_request_duration, RequestTimer};

pub mod config;
pub mod email;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod providers;
pub mod server;
pub mod signals;

pub use observability::init_tracing;

//! Logging and metrics.

pub mod logging;
pub mod metrics;

pub use logging::{LoggingConfig, TracingError, init_tracing};

//! Retry, backoff and fallback engine.
//!
//! [`OrderRetryExecutor::execute_with_retry`] wraps a placement closure:
//! each failure is classified, at most one [`FallbackAction`] is applied to
//! the working copy of the order, and the loop sleeps per the configured
//! [`RetryStrategy`] before trying again. Attempts and wall-clock time are
//! both bounded.
//!
//! # Example
//!
//! ```rust,ignore
//! use order_engine::retry::{OrderRetryExecutor, RetryConfig, FallbackConfig};
//! use order_engine::partial_fill::PartialFillResolver;
//!
//! let executor = OrderRetryExecutor::new(
//!     RetryConfig::default(),
//!     FallbackConfig::default(),
//!     PartialFillResolver::default(),
//! );
//! let response = executor
//!     .execute_with_retry(&order, |working| async move { place(working).await })
//!     .await;
//! ```

mod context;
mod executor;
pub mod fallback;
mod operation;
mod policy;

pub use context::{ActiveRetry, RetryAttempt, RetryContext};
pub use executor::{OrderRetryExecutor, RetryOutcome, RetryStatistics};
pub use fallback::{FallbackAction, FallbackConfig};
pub use operation::{OperationRetryConfig, retry_operation};
pub use policy::{BackoffCalculator, RetryConfig, RetryStrategy};

//! Retry helper for non-placement gateway calls (cancel, books, quotes).
//!
//! Only transient failures are retried; anything else returns at once.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{BackoffCalculator, RetryConfig, RetryStrategy};
use crate::gateway::GatewayError;

/// Retry settings for gateway queries and cancels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationRetryConfig {
    /// Attempts per call.
    pub max_attempts: u32,
    /// Base delay.
    pub base_delay_ms: u64,
    /// Delay cap.
    pub max_delay_ms: u64,
    /// Exponential growth factor.
    pub backoff_multiplier: f64,
}

impl Default for OperationRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl OperationRetryConfig {
    fn backoff(&self) -> BackoffCalculator {
        BackoffCalculator::new(&RetryConfig {
            strategy: RetryStrategy::Exponential,
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
            jitter: true,
            ..RetryConfig::default()
        })
    }
}

/// Run `op`, retrying transient failures with exponential backoff.
pub async fn retry_operation<T, F, Fut>(
    config: &OperationRetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let backoff = config.backoff();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts || !e.category().is_transient() {
                    return Err(e);
                }
                let delay: Duration = backoff.delay(attempt - 1);
                warn!(
                    operation,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Gateway call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

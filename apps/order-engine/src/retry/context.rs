//! Per-call retry bookkeeping.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::FallbackAction;
use crate::gateway::FailureCategory;
use crate::models::OrderRequest;

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number within the current round.
    pub attempt_number: u32,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
    /// Failure message.
    pub error_message: String,
    /// Classified failure.
    pub category: FailureCategory,
    /// Sleep before the next attempt; zero for the final one.
    pub delay_used: Duration,
    /// Mutation applied to the working order.
    pub fallback_applied: Option<FallbackAction>,
}

/// State of one `execute_with_retry` call. Never persisted.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Order as submitted.
    pub original_order: OrderRequest,
    /// Working copy, mutated by fallbacks and partial-fill remainders.
    pub current_order: OrderRequest,
    /// Failed attempts, in order.
    pub attempts: Vec<RetryAttempt>,
    /// Quantity filled across partial fills.
    pub total_filled: u32,
    /// Quantity still to fill.
    pub remaining_quantity: u32,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Monotonic start.
    pub started: Instant,
    /// Last failure message.
    pub last_error: Option<String>,
    /// Fallbacks applied so far.
    pub fallbacks_applied: Vec<FallbackAction>,
}

impl RetryContext {
    /// Start a context for `order`.
    #[must_use]
    pub fn new(order: OrderRequest) -> Self {
        Self {
            remaining_quantity: order.quantity,
            current_order: order.clone(),
            original_order: order,
            attempts: Vec::new(),
            total_filled: 0,
            started_at: Utc::now(),
            started: Instant::now(),
            last_error: None,
            fallbacks_applied: Vec::new(),
        }
    }

    /// Time since the call started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Number of fallbacks of a given kind.
    #[must_use]
    pub fn fallback_count(&self, action: FallbackAction) -> usize {
        self.fallbacks_applied.iter().filter(|a| **a == action).count()
    }

    pub(crate) fn snapshot(&self, context_id: &str) -> ActiveRetry {
        ActiveRetry {
            context_id: context_id.to_string(),
            symbol: self.original_order.symbol.clone(),
            attempts: self.attempts.len(),
            total_filled: self.total_filled,
            remaining_quantity: self.remaining_quantity,
            elapsed: self.elapsed(),
            last_error: self.last_error.clone(),
            fallbacks_applied: self.fallbacks_applied.clone(),
        }
    }
}

/// Snapshot of an in-flight retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveRetry {
    /// Context id.
    pub context_id: String,
    /// Symbol of the original order.
    pub symbol: String,
    /// Failed attempts so far.
    pub attempts: usize,
    /// Quantity filled so far.
    pub total_filled: u32,
    /// Quantity left.
    pub remaining_quantity: u32,
    /// Time in flight.
    pub elapsed: Duration,
    /// Last failure message.
    pub last_error: Option<String>,
    /// Fallbacks applied so far.
    pub fallbacks_applied: Vec<FallbackAction>,
}

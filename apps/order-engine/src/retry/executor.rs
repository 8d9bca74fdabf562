//! Retry loop around a placement operation.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    BackoffCalculator, FallbackAction, FallbackConfig, RetryAttempt, RetryConfig, RetryContext,
    context::ActiveRetry, fallback,
};
use crate::error::ErrorCode;
use crate::gateway::{GatewayError, classify_failure};
use crate::models::{OrderRequest, OrderResponse, OrderStatus};
use crate::observability::metrics;
use crate::partial_fill::{PartialFill, PartialFillDisposition, PartialFillResolver};

/// Counters over the executor's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryStatistics {
    /// Retry sleeps taken.
    pub total_retries: u64,
    /// Calls that ended in success.
    pub successful: u64,
    /// Calls that ended in a terminal failure.
    pub failed: u64,
    /// Fallback mutations applied.
    pub fallbacks_used: u64,
    /// Escalations to an operator.
    pub manual_interventions: u64,
    /// Calls in flight.
    pub active_retries: usize,
}

#[derive(Debug, Default)]
struct ExecutorState {
    stats: RetryStatistics,
    active: HashMap<String, ActiveRetry>,
}

/// Result of one `execute_with_context` call.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// Final response.
    pub response: OrderResponse,
    /// Bookkeeping of the call.
    pub context: RetryContext,
}

enum PartialStep {
    Continue,
    Done(OrderResponse),
}

/// Drives placement attempts with backoff, fallbacks and partial-fill
/// resolution.
#[derive(Debug)]
pub struct OrderRetryExecutor {
    retry: RetryConfig,
    fallback: FallbackConfig,
    backoff: BackoffCalculator,
    partial_fills: PartialFillResolver,
    state: Mutex<ExecutorState>,
}

impl OrderRetryExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(
        retry: RetryConfig,
        fallback: FallbackConfig,
        partial_fills: PartialFillResolver,
    ) -> Self {
        Self {
            backoff: BackoffCalculator::new(&retry),
            retry,
            fallback,
            partial_fills,
            state: Mutex::new(ExecutorState::default()),
        }
    }

    /// Retry settings.
    #[must_use]
    pub const fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Place `order` through `place_fn`, retrying per policy.
    ///
    /// `place_fn` receives the working copy; gateway errors count as
    /// rejections.
    pub async fn execute_with_retry<F, Fut>(
        &self,
        order: &OrderRequest,
        place_fn: F,
    ) -> OrderResponse
    where
        F: FnMut(OrderRequest) -> Fut,
        Fut: Future<Output = Result<OrderResponse, GatewayError>>,
    {
        self.execute_with_context(order, place_fn).await.response
    }

    /// Same as [`Self::execute_with_retry`], also returning the context.
    pub async fn execute_with_context<F, Fut>(
        &self,
        order: &OrderRequest,
        mut place_fn: F,
    ) -> RetryOutcome
    where
        F: FnMut(OrderRequest) -> Fut,
        Fut: Future<Output = Result<OrderResponse, GatewayError>>,
    {
        let context_id = Uuid::new_v4().to_string();
        let mut context = RetryContext::new(order.clone());
        self.publish(&context_id, &context);

        let response = self.run(&context_id, &mut context, &mut place_fn).await;

        {
            let mut state = self.state.lock();
            state.active.remove(&context_id);
            if response.is_success() {
                state.stats.successful += 1;
            } else {
                state.stats.failed += 1;
            }
            state.stats.active_retries = state.active.len();
            metrics::update_active_retries(state.active.len());
        }

        RetryOutcome { response, context }
    }

    async fn run<F, Fut>(
        &self,
        context_id: &str,
        context: &mut RetryContext,
        place_fn: &mut F,
    ) -> OrderResponse
    where
        F: FnMut(OrderRequest) -> Fut,
        Fut: Future<Output = Result<OrderResponse, GatewayError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let timeout = self.retry.timeout();
        let mut attempt: u32 = 0;

        loop {
            if attempt >= max_attempts {
                return self.exhausted(context, max_attempts);
            }
            if context.elapsed() > timeout {
                return self.timed_out(context);
            }

            let (message, category) = match place_fn(context.current_order.clone()).await {
                Ok(response)
                    if response.status == OrderStatus::Partial && response.filled_quantity > 0 =>
                {
                    match self.resolve_partial(context_id, context, &response).await {
                        PartialStep::Done(response) => return response,
                        PartialStep::Continue => {
                            attempt = 0;
                            continue;
                        }
                    }
                }
                Ok(response)
                    if response.is_success() && response.status != OrderStatus::Partial =>
                {
                    info!(
                        symbol = %context.current_order.symbol,
                        order_id = response.order_id.as_deref().unwrap_or_default(),
                        attempt = attempt + 1,
                        "Order placed"
                    );
                    return response;
                }
                Ok(response) => {
                    let category = classify_failure(&response.message);
                    (response.message, category)
                }
                Err(e) => {
                    let category = e.category();
                    (e.to_string(), category)
                }
            };

            attempt += 1;
            context.last_error = Some(message.clone());
            let mut record = RetryAttempt {
                attempt_number: attempt,
                timestamp: chrono::Utc::now(),
                error_message: message.clone(),
                category,
                delay_used: Duration::ZERO,
                fallback_applied: None,
            };

            if attempt < max_attempts {
                let failures = context.attempts.len() + 1;
                let selected = fallback::select_fallback(&self.fallback, category, failures);

                if selected == Some(FallbackAction::ManualIntervention) {
                    record.fallback_applied = selected;
                    context.attempts.push(record);
                    context.fallbacks_applied.push(FallbackAction::ManualIntervention);
                    self.publish(context_id, context);
                    return self.escalate(context);
                }

                let applied = selected.and_then(|action| {
                    fallback::apply_fallback(&self.fallback, action, &mut context.current_order)
                });
                if let Some(applied) = applied {
                    record.fallback_applied = Some(applied);
                    context.fallbacks_applied.push(applied);
                    self.state.lock().stats.fallbacks_used += 1;
                    metrics::record_fallback(applied.as_str());
                }

                let delay = self.backoff.delay(attempt - 1);
                record.delay_used = delay;
                warn!(
                    symbol = %context.current_order.symbol,
                    attempt,
                    error = %message,
                    category = %category,
                    fallback = ?record.fallback_applied,
                    delay_ms = delay.as_millis() as u64,
                    "Order attempt failed, retrying"
                );
                context.attempts.push(record);
                self.publish(context_id, context);

                tokio::time::sleep(delay).await;
                self.state.lock().stats.total_retries += 1;
                metrics::record_retry();
            } else {
                context.attempts.push(record);
                self.publish(context_id, context);
            }
        }
    }

    async fn resolve_partial(
        &self,
        context_id: &str,
        context: &mut RetryContext,
        response: &OrderResponse,
    ) -> PartialStep {
        let order_id = response.order_id.clone().unwrap_or_default();
        let working_quantity = context.current_order.quantity;
        let filled = response.filled_quantity.min(working_quantity);
        let remaining = working_quantity - filled;

        context.total_filled += filled;
        context.remaining_quantity = remaining;
        self.publish(context_id, context);

        info!(
            order_id = %order_id,
            filled,
            remaining,
            total_filled = context.total_filled,
            "Partial fill"
        );

        if remaining == 0 {
            let mut done = response.clone();
            done.status = OrderStatus::Complete;
            done.message = "Order completed through partial fills".to_string();
            done.filled_quantity = context.total_filled;
            return PartialStep::Done(done);
        }

        let fill = PartialFill {
            order_id: order_id.clone(),
            filled_quantity: filled,
            remaining_quantity: remaining,
            fill_price: response.average_price,
        };
        let observed = Instant::now();
        let timeout = self.retry.timeout();

        loop {
            let disposition =
                self.partial_fills
                    .resolve(&fill, context.current_order.action, observed.elapsed());
            match disposition {
                PartialFillDisposition::PlaceRemainder { kind, price, urgent } => {
                    info!(
                        order_id = %order_id,
                        remaining,
                        kind = %kind,
                        urgent,
                        "Placing partial fill remainder"
                    );
                    context.current_order = PartialFillResolver::remainder_order(
                        &context.current_order,
                        &fill,
                        kind,
                        price,
                    );
                    self.publish(context_id, context);
                    return PartialStep::Continue;
                }
                PartialFillDisposition::Wait { check_after } => {
                    let left = timeout.saturating_sub(context.elapsed());
                    if left.is_zero() {
                        return PartialStep::Done(Self::partial_cancelled(
                            response, context, "retry timeout",
                        ));
                    }
                    tokio::time::sleep(check_after.min(left)).await;
                }
                PartialFillDisposition::CancelRemaining { reason } => {
                    return PartialStep::Done(Self::partial_cancelled(response, context, &reason));
                }
            }
        }
    }

    fn partial_cancelled(
        response: &OrderResponse,
        context: &RetryContext,
        reason: &str,
    ) -> OrderResponse {
        warn!(
            order_id = response.order_id.as_deref().unwrap_or_default(),
            filled = context.total_filled,
            remaining = context.remaining_quantity,
            reason,
            "Partial fill remainder cancelled"
        );
        let mut cancelled = response.clone();
        cancelled.status = OrderStatus::Partial;
        cancelled.message = format!(
            "Partial fill: {} filled, {} remaining cancelled ({reason})",
            context.total_filled, context.remaining_quantity
        );
        cancelled.error_code = Some(ErrorCode::PartialFillCancelled);
        cancelled.filled_quantity = context.total_filled;
        cancelled.pending_quantity = context.remaining_quantity;
        cancelled
    }

    fn exhausted(&self, context: &RetryContext, max_attempts: u32) -> OrderResponse {
        let last_error = context.last_error.as_deref().unwrap_or("unknown");
        error!(
            symbol = %context.original_order.symbol,
            attempts = max_attempts,
            last_error,
            "Order failed after all retry attempts"
        );
        OrderResponse::rejected(
            format!("Order failed after {max_attempts} attempts. Last error: {last_error}"),
            Some(ErrorCode::MaxRetriesExceeded),
        )
    }

    fn timed_out(&self, context: &RetryContext) -> OrderResponse {
        let last_error = context.last_error.as_deref().unwrap_or("unknown");
        error!(
            symbol = %context.original_order.symbol,
            timeout_secs = self.retry.timeout_secs,
            attempts = context.attempts.len(),
            last_error,
            "Order retry timeout"
        );
        OrderResponse::rejected(
            format!(
                "Retry timeout exceeded after {}s. Last error: {last_error}",
                self.retry.timeout_secs
            ),
            Some(ErrorCode::RetryTimeout),
        )
    }

    fn escalate(&self, context: &RetryContext) -> OrderResponse {
        self.state.lock().stats.manual_interventions += 1;
        metrics::record_manual_intervention();
        let last_error = context.last_error.as_deref().unwrap_or("unknown");
        error!(
            symbol = %context.original_order.symbol,
            attempts = context.attempts.len(),
            last_error,
            "Manual intervention required"
        );
        OrderResponse::rejected(
            format!(
                "Manual intervention required after {} failures. Last error: {last_error}",
                context.attempts.len()
            ),
            Some(ErrorCode::ManualIntervention),
        )
    }

    fn publish(&self, context_id: &str, context: &RetryContext) {
        let mut state = self.state.lock();
        state
            .active
            .insert(context_id.to_string(), context.snapshot(context_id));
        state.stats.active_retries = state.active.len();
    }

    /// Lifetime counters.
    #[must_use]
    pub fn statistics(&self) -> RetryStatistics {
        self.state.lock().stats.clone()
    }

    /// Snapshot of in-flight retries, keyed by context id.
    #[must_use]
    pub fn active_retries(&self) -> HashMap<String, ActiveRetry> {
        self.state.lock().active.clone()
    }
}

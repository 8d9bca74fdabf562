//! Metrics for order placement, retries and trade exits.
//!
//! Recorded through the `metrics` facade; the host process installs an
//! exporter. Without one, every call is a no-op.

use metrics::{counter, gauge};

/// Record an order submission outcome.
///
/// # Arguments
///
/// * `mode` - `"paper"` or `"live"`
/// * `status` - `"accepted"` or `"rejected"`
/// * `order_type` - Order kind (e.g. `"MARKET"`, `"LIMIT"`)
pub fn record_order_submission(mode: &str, status: &str, order_type: &str) {
    counter!(
        "order_submissions_total",
        "mode" => mode.to_string(),
        "status" => status.to_string(),
        "order_type" => order_type.to_string()
    )
    .increment(1);
}

/// Record an order rejection by error code.
pub fn record_order_rejection(mode: &str, reason: &str) {
    counter!(
        "order_rejection_total",
        "mode" => mode.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record one retry sleep.
pub fn record_retry() {
    counter!("order_retries_total").increment(1);
}

/// Record a fallback mutation.
pub fn record_fallback(action: &str) {
    counter!("order_fallbacks_total", "action" => action.to_string()).increment(1);
}

/// Record an escalation to manual intervention.
pub fn record_manual_intervention() {
    counter!("order_manual_interventions_total").increment(1);
}

/// Update the in-flight retry gauge.
pub fn update_active_retries(count: usize) {
    gauge!("order_active_retries").set(count as f64);
}

/// Record an OCO sibling cancellation.
pub fn record_oco_triggered(filled_leg: &str) {
    counter!("oco_triggered_total", "filled_leg" => filled_leg.to_string()).increment(1);
}

/// Record a trade close attempt.
///
/// # Arguments
///
/// * `reason` - Close reason (e.g. `"TARGET_HIT"`)
/// * `outcome` - `"closed"` or `"failed"`
pub fn record_trade_close(reason: &str, outcome: &str) {
    counter!(
        "trade_closes_total",
        "reason" => reason.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Update the open trades gauge.
pub fn update_open_trades(count: usize) {
    gauge!("open_trades").set(count as f64);
}

/// Update the daily P&L gauge.
pub fn update_daily_pnl(pnl: f64) {
    gauge!("daily_pnl").set(pnl);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorders_are_noops_without_exporter() {
        record_order_submission("paper", "accepted", "LIMIT");
        record_order_rejection("live", "VALIDATION_ERROR");
        record_retry();
        record_fallback("adjust_price");
        record_manual_intervention();
        update_active_retries(2);
        record_oco_triggered("target");
        record_trade_close("TARGET_HIT", "closed");
        update_open_trades(3);
        update_daily_pnl(-1250.5);
    }
}

//! Background refresh loop: order statuses, position prices, OCO sweep.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{OrderManager, TradingMode, execution_record, paper};
use crate::models::{OrderRequest, OrderStatus, Trade};
use crate::partial_fill::{PartialFill, PartialFillDisposition, PartialFillResolver};
use crate::observability::metrics;
use crate::retry::retry_operation;

/// Refresh loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Time between cycles.
    pub interval_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { interval_ms: 30_000 }
    }
}

impl OrderManager {
    /// Spawn the refresh loop. No-op if it is already running.
    pub fn start_monitoring(self: &Arc<Self>) {
        let token = {
            let mut state = self.state.lock();
            if state.monitor.is_some() {
                warn!("Order monitoring already running");
                return;
            }
            let token = CancellationToken::new();
            state.monitor = Some(token.clone());
            token
        };

        let manager = Arc::clone(self);
        let period = Duration::from_millis(self.monitoring.interval_ms.max(1));

        tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "Order monitoring started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => manager.run_monitor_cycle().await,
                    () = token.cancelled() => break,
                }
            }
            info!("Order monitoring stopped");
        });
    }

    /// Stop the refresh loop.
    pub fn stop_monitoring(&self) {
        if let Some(token) = self.state.lock().monitor.take() {
            token.cancel();
        }
    }

    /// Whether the refresh loop is running.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.state.lock().monitor.is_some()
    }

    /// One refresh cycle.
    pub async fn run_monitor_cycle(&self) {
        match self.mode {
            TradingMode::Live => self.refresh_order_statuses().await,
            TradingMode::Paper => self.trigger_paper_stops().await,
        }
        self.refresh_position_prices().await;
        self.check_oco_orders().await;
    }

    async fn refresh_order_statuses(&self) {
        let book = match retry_operation(&self.operations, "get_order_book", || {
            self.gateway.get_order_book()
        })
        .await
        {
            Ok(book) => book,
            Err(e) => {
                error!(error = %e, "Error updating order status");
                return;
            }
        };

        let mut partials = Vec::new();
        {
            let mut state = self.state.lock();
            for entry in book {
                let changed = state.transition(&entry.order_id, entry.status);
                if changed {
                    debug!(
                        order_id = %entry.order_id,
                        status = %entry.status,
                        "Order status updated"
                    );
                }
                let Some((request, status)) = state
                    .orders
                    .get(&entry.order_id)
                    .map(|o| (o.request.clone(), o.status))
                else {
                    continue;
                };

                match status {
                    OrderStatus::Partial if entry.filled_quantity > 0 => {
                        let remaining = request.quantity.saturating_sub(entry.filled_quantity);
                        if remaining == 0 {
                            continue;
                        }
                        let observed = *state
                            .partial_fills
                            .entry(entry.order_id.clone())
                            .or_insert_with(Instant::now);
                        let fill = PartialFill {
                            order_id: entry.order_id.clone(),
                            filled_quantity: entry.filled_quantity,
                            remaining_quantity: remaining,
                            fill_price: entry.average_price,
                        };
                        partials.push((request, fill, observed.elapsed()));
                    }
                    OrderStatus::Complete if changed => {
                        state.partial_fills.remove(&entry.order_id);
                        let quantity = if entry.filled_quantity > 0 {
                            entry.filled_quantity
                        } else {
                            request.quantity
                        };
                        let price = fill_price(&request, entry.average_price);
                        state
                            .executions
                            .push(execution_record(&entry.order_id, &request, quantity, price));
                        info!(order_id = %entry.order_id, quantity, price = %price, "Order filled");
                    }
                    status if status.is_terminal() => {
                        state.partial_fills.remove(&entry.order_id);
                    }
                    _ => {}
                }
            }
        }

        for (request, fill, elapsed) in partials {
            self.resolve_partial_fill(&request, &fill, elapsed).await;
        }
    }

    /// Apply the configured disposition to a partially filled live order.
    ///
    /// The broker order is cancelled before a remainder order is placed, so
    /// the remainder never works twice. `Wait` leaves the order alone until a
    /// later cycle.
    async fn resolve_partial_fill(
        &self,
        request: &OrderRequest,
        fill: &PartialFill,
        elapsed: Duration,
    ) {
        let disposition = self.partial_fills.resolve(fill, request.action, elapsed);
        let remainder = match disposition {
            PartialFillDisposition::Wait { check_after } => {
                debug!(
                    order_id = %fill.order_id,
                    remaining = fill.remaining_quantity,
                    check_after_ms = check_after.as_millis() as u64,
                    "Partial fill waiting"
                );
                return;
            }
            PartialFillDisposition::CancelRemaining { reason } => {
                info!(
                    order_id = %fill.order_id,
                    filled = fill.filled_quantity,
                    remaining = fill.remaining_quantity,
                    reason = %reason,
                    "Cancelling partial fill remainder"
                );
                None
            }
            PartialFillDisposition::PlaceRemainder { kind, price, urgent } => {
                info!(
                    order_id = %fill.order_id,
                    remaining = fill.remaining_quantity,
                    kind = %kind,
                    urgent,
                    "Replacing partial fill remainder"
                );
                Some(PartialFillResolver::remainder_order(request, fill, kind, price))
            }
        };

        if !self.cancel_order(&fill.order_id).await {
            warn!(
                order_id = %fill.order_id,
                "Partial fill remainder not cancelled, retrying next cycle"
            );
            return;
        }
        {
            let mut state = self.state.lock();
            state.partial_fills.remove(&fill.order_id);
            let price = fill_price(request, fill.fill_price);
            state
                .executions
                .push(execution_record(&fill.order_id, request, fill.filled_quantity, price));
        }

        if let Some(remainder) = remainder {
            let response = self.place_order(&remainder).await;
            if !response.is_success() {
                error!(
                    parent_order_id = %fill.order_id,
                    message = %response.message,
                    "Partial fill remainder placement failed"
                );
            }
        }
    }

    async fn trigger_paper_stops(&self) {
        let stops = self.state.lock().paper.resting_stops();
        for (order_id, order) in stops {
            let ltp = match self
                .gateway
                .get_ltp(&order.exchange, &order.symbol, &order.token)
                .await
            {
                Ok(Some(ltp)) => ltp,
                Ok(None) => continue,
                Err(e) => {
                    warn!(symbol = %order.symbol, error = %e, "Could not fetch LTP for paper stop");
                    continue;
                }
            };
            if !paper::stop_triggered(&order, ltp) {
                continue;
            }

            let price = order.trigger_price.unwrap_or(ltp);
            let mut state = self.state.lock();
            if !state.paper.is_resting(&order_id) {
                continue;
            }
            state.paper.fill(&order_id, &order, price);
            state.transition(&order_id, OrderStatus::Complete);
            state
                .executions
                .push(execution_record(&order_id, &order, order.quantity, price));
            info!(
                order_id = %order_id,
                symbol = %order.symbol,
                price = %price,
                "Paper stop triggered"
            );
        }
    }

    async fn refresh_position_prices(&self) {
        if self.mode == TradingMode::Live {
            self.refresh_live_positions().await;
        }
        let positions = self.state.lock().positions(self.mode);

        for position in positions {
            let ltp = match self
                .gateway
                .get_ltp(&position.exchange, &position.symbol, &position.token)
                .await
            {
                Ok(Some(ltp)) => ltp,
                Ok(None) => continue,
                Err(e) => {
                    warn!(symbol = %position.symbol, error = %e, "Could not update LTP");
                    continue;
                }
            };
            let key = position.key();
            let mut state = self.state.lock();
            let slot = match self.mode {
                TradingMode::Paper => state.paper.position_mut(&key),
                TradingMode::Live => state.live_positions.get_mut(&key),
            };
            if let Some(slot) = slot {
                slot.update_ltp(ltp);
            }
        }
    }

    /// Cancel the sibling of any filled OCO leg.
    ///
    /// Pairs are deactivated under the lock before any cancel is sent, so a
    /// sibling is cancelled at most once.
    async fn check_oco_orders(&self) {
        let triggered: Vec<(String, String, &'static str)> = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let orders = &state.orders;
            let mut triggered = Vec::new();
            for (key, oco) in state.oco_orders.iter_mut().filter(|(_, o)| o.active) {
                let status = |id: &str| orders.get(id).map(|o| o.status);
                if status(&oco.target_order_id) == Some(OrderStatus::Complete) {
                    oco.active = false;
                    triggered.push((key.clone(), oco.stop_order_id.clone(), "target"));
                } else if status(&oco.stop_order_id) == Some(OrderStatus::Complete) {
                    oco.active = false;
                    triggered.push((key.clone(), oco.target_order_id.clone(), "stop"));
                }
            }
            triggered
        };

        for (key, sibling, filled_leg) in triggered {
            metrics::record_oco_triggered(filled_leg);
            if self.cancel_order(&sibling).await {
                info!(
                    position = %key,
                    filled_leg,
                    cancelled = %sibling,
                    "OCO leg filled, sibling cancelled"
                );
            } else {
                error!(
                    position = %key,
                    filled_leg,
                    sibling = %sibling,
                    "OCO leg filled but sibling cancel failed"
                );
            }
        }
    }

    /// Refresh leg prices from current positions and report trades whose
    /// P&L crossed a bound. Nothing is closed here.
    ///
    /// Actions are `CLOSE_TRADE_<id>_TARGET_HIT` or
    /// `CLOSE_TRADE_<id>_STOP_LOSS`.
    pub async fn monitor_positions(&self, trades: &mut [Trade]) -> Vec<String> {
        let positions = self.get_positions().await;
        let mut actions = Vec::new();

        for trade in trades.iter_mut().filter(|t| t.is_open()) {
            for leg in &mut trade.legs {
                let key = leg.position_key();
                if let Some(position) = positions.iter().find(|p| p.key() == key) {
                    leg.current_price = position.ltp;
                }
            }
            let pnl = trade.unrealized_pnl();
            if pnl >= trade.target_pnl {
                actions.push(format!("CLOSE_TRADE_{}_TARGET_HIT", trade.id));
            } else if pnl <= trade.stop_loss_pnl {
                actions.push(format!("CLOSE_TRADE_{}_STOP_LOSS", trade.id));
            }
        }
        actions
    }
}

fn fill_price(request: &OrderRequest, reported: Option<Decimal>) -> Decimal {
    reported
        .or(request.price)
        .or(request.trigger_price)
        .unwrap_or(Decimal::ZERO)
}

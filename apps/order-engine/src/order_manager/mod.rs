//! Order Manager
//!
//! Validates, places (live or paper), cancels and tracks orders, links OCO
//! exit pairs, and runs the background refresh loop.
//!
//! All bookkeeping sits behind one coarse lock. The lock is never held
//! across a gateway call; callers get cloned snapshots.

mod monitor;
mod paper;
mod trade;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ErrorCode;
use crate::gateway::BrokerGateway;
use crate::models::{
    OcoOrder, OrderRequest, OrderResponse, OrderStateMachine, OrderStatus, Position,
    TradeExecution,
};
use crate::observability::metrics;
use crate::partial_fill::{PartialFillConfig, PartialFillResolver};
use crate::retry::{
    ActiveRetry, FallbackConfig, OperationRetryConfig, OrderRetryExecutor, RetryConfig,
    RetryStatistics, retry_operation,
};
use crate::validation::{MarketSnapshot, OrderValidator, ValidationConfig};

pub use monitor::MonitoringConfig;
pub use paper::PaperConfig;

/// Execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Simulated fills, no broker orders.
    #[default]
    Paper,
    /// Real broker orders.
    Live,
}

impl TradingMode {
    /// Lowercase name, used as a metrics label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for an [`OrderManager`].
#[derive(Debug, Clone, Default)]
pub struct OrderManagerConfig {
    /// Execution mode.
    pub mode: TradingMode,
    /// Placement retry policy.
    pub retry: RetryConfig,
    /// Fallback mutations.
    pub fallback: FallbackConfig,
    /// Partial fill handling.
    pub partial_fill: PartialFillConfig,
    /// Retry policy for cancels and book queries.
    pub operations: OperationRetryConfig,
    /// Pre-trade checks.
    pub validation: ValidationConfig,
    /// Paper simulation.
    pub paper: PaperConfig,
    /// Background loop.
    pub monitoring: MonitoringConfig,
}

/// An order the manager has seen accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedOrder {
    /// Request as finally placed (after any fallbacks).
    pub request: OrderRequest,
    /// Last known status.
    pub status: OrderStatus,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// Exposure view for external risk controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposureSnapshot {
    /// Execution mode.
    pub mode: TradingMode,
    /// Open positions.
    pub positions: Vec<Position>,
    /// Orders not yet in a terminal state.
    pub active_orders: usize,
    /// Sum of position unrealized P&L.
    pub unrealized_pnl: Decimal,
    /// Realized P&L, including positions already flattened.
    pub realized_pnl: Decimal,
    /// Active OCO pairs.
    pub active_oco_orders: usize,
    /// Snapshot time.
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ManagerState {
    orders: HashMap<String, TrackedOrder>,
    executions: Vec<TradeExecution>,
    live_positions: HashMap<String, Position>,
    live_flat_pnl: Decimal,
    oco_orders: HashMap<String, OcoOrder>,
    partial_fills: HashMap<String, Instant>,
    paper: paper::PaperBook,
    monitor: Option<CancellationToken>,
}

impl ManagerState {
    fn track(&mut self, order_id: &str, request: OrderRequest, status: OrderStatus) {
        self.orders.insert(
            order_id.to_string(),
            TrackedOrder {
                request,
                status,
                updated_at: Utc::now(),
            },
        );
    }

    /// Move a tracked order through the state machine.
    fn transition(&mut self, order_id: &str, to: OrderStatus) -> bool {
        let Some(tracked) = self.orders.get_mut(order_id) else {
            return false;
        };
        if tracked.status == to {
            return false;
        }
        if let Err(e) = OrderStateMachine::validate_transition(tracked.status, to) {
            warn!(order_id, error = %e, "Ignoring status update");
            return false;
        }
        tracked.status = to;
        tracked.updated_at = Utc::now();
        true
    }

    fn positions(&self, mode: TradingMode) -> Vec<Position> {
        match mode {
            TradingMode::Paper => self.paper.positions(),
            TradingMode::Live => self.live_positions.values().cloned().collect(),
        }
    }

    fn realized_pnl(&self, mode: TradingMode) -> Decimal {
        match mode {
            TradingMode::Paper => self.paper.realized_pnl(),
            TradingMode::Live => {
                self.live_flat_pnl
                    + self
                        .live_positions
                        .values()
                        .map(|p| p.realized_pnl)
                        .sum::<Decimal>()
            }
        }
    }
}

/// Order lifecycle manager.
pub struct OrderManager {
    gateway: Arc<dyn BrokerGateway>,
    mode: TradingMode,
    validator: OrderValidator,
    executor: OrderRetryExecutor,
    partial_fills: PartialFillResolver,
    operations: OperationRetryConfig,
    paper: PaperConfig,
    monitoring: MonitoringConfig,
    state: Mutex<ManagerState>,
}

impl fmt::Debug for OrderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderManager")
            .field("mode", &self.mode)
            .field("validator", &self.validator)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl OrderManager {
    /// Create a manager over `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<dyn BrokerGateway>, config: OrderManagerConfig) -> Self {
        let partial_fills = PartialFillResolver::new(config.partial_fill);
        Self {
            gateway,
            mode: config.mode,
            validator: OrderValidator::new(config.validation),
            executor: OrderRetryExecutor::new(config.retry, config.fallback, partial_fills.clone()),
            partial_fills,
            operations: config.operations,
            paper: config.paper,
            monitoring: config.monitoring,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Execution mode.
    #[must_use]
    pub const fn mode(&self) -> TradingMode {
        self.mode
    }

    /// Pre-trade validator.
    #[must_use]
    pub const fn validator(&self) -> &OrderValidator {
        &self.validator
    }

    /// Placement retry counters.
    #[must_use]
    pub fn retry_statistics(&self) -> RetryStatistics {
        self.executor.statistics()
    }

    /// In-flight placement retries.
    #[must_use]
    pub fn active_retries(&self) -> HashMap<String, ActiveRetry> {
        self.executor.active_retries()
    }

    /// Validate and place an order.
    ///
    /// Validation failures never reach the gateway.
    pub async fn place_order(&self, order: &OrderRequest) -> OrderResponse {
        let ltp = match self
            .gateway
            .get_ltp(&order.exchange, &order.symbol, &order.token)
            .await
        {
            Ok(ltp) => ltp,
            Err(e) => {
                warn!(symbol = %order.symbol, error = %e, "Could not fetch LTP for validation");
                None
            }
        };
        let market = ltp.map(MarketSnapshot::from_ltp);

        let validation = self.validator.validate_order(order, market.as_ref());
        if !validation.is_valid {
            error!(
                symbol = %order.symbol,
                reason = %validation.message,
                "Order validation failed"
            );
            metrics::record_order_rejection(
                self.mode.as_str(),
                ErrorCode::ValidationError.reason(),
            );
            return OrderResponse::rejected(
                format!("Validation failed: {}", validation.message),
                Some(ErrorCode::ValidationError),
            );
        }
        if let Some(warning) = &validation.warning {
            warn!(symbol = %order.symbol, warning = %warning, "Order validation warning");
        }

        let response = match self.mode {
            TradingMode::Paper => self.place_paper_order(order, ltp),
            TradingMode::Live => self.place_live_order(order).await,
        };

        let outcome = if response.is_success() { "accepted" } else { "rejected" };
        metrics::record_order_submission(self.mode.as_str(), outcome, &order.kind.to_string());
        if let Some(code) = response.error_code {
            metrics::record_order_rejection(self.mode.as_str(), code.reason());
        }
        response
    }

    async fn place_live_order(&self, order: &OrderRequest) -> OrderResponse {
        let gateway = Arc::clone(&self.gateway);
        let outcome = self
            .executor
            .execute_with_context(order, move |working| {
                let gateway = Arc::clone(&gateway);
                async move {
                    match gateway.place_order(&working).await {
                        Ok(order_id) if !order_id.is_empty() => Ok(OrderResponse::accepted(
                            order_id,
                            OrderStatus::Pending,
                            "Order placed successfully",
                        )),
                        Ok(_) => Ok(OrderResponse::rejected(
                            "Order placement failed: broker returned no order id",
                            Some(ErrorCode::PlacementError),
                        )),
                        Err(e) => Err(e),
                    }
                }
            })
            .await;

        let response = outcome.response;
        let Some(order_id) = response.order_id.clone() else {
            error!(symbol = %order.symbol, message = %response.message, "Live order failed");
            return response;
        };

        self.state
            .lock()
            .track(&order_id, outcome.context.current_order, response.status);
        info!(
            order_id = %order_id,
            symbol = %order.symbol,
            status = %response.status,
            "Order placed"
        );
        response
    }

    fn place_paper_order(&self, order: &OrderRequest, ltp: Option<Decimal>) -> OrderResponse {
        let mut state = self.state.lock();
        let order_id = state.paper.next_order_id();

        if order.kind.requires_trigger() {
            state.paper.rest(order_id.clone(), order.clone());
            state.track(&order_id, order.clone(), OrderStatus::Pending);
            info!(
                order_id = %order_id,
                symbol = %order.symbol,
                trigger = ?order.trigger_price,
                "Paper stop order resting"
            );
            return OrderResponse::accepted(
                order_id,
                OrderStatus::Pending,
                "Paper stop order resting",
            );
        }

        let Some(price) = paper::simulated_fill_price(order, ltp, &self.paper) else {
            error!(symbol = %order.symbol, "Paper fill could not be priced");
            return OrderResponse::rejected(
                "Paper order simulation failed: no price available",
                Some(ErrorCode::PaperSimulationError),
            );
        };

        state.paper.fill(&order_id, order, price);
        state.track(&order_id, order.clone(), OrderStatus::Complete);
        state.executions.push(execution_record(&order_id, order, order.quantity, price));
        info!(order_id = %order_id, symbol = %order.symbol, price = %price, "Paper order executed");

        OrderResponse::accepted(
            order_id,
            OrderStatus::Complete,
            format!("Paper order executed at {price}"),
        )
        .with_fill(order.quantity, Some(price))
    }

    /// Cancel a tracked order.
    pub async fn cancel_order(&self, order_id: &str) -> bool {
        match self.mode {
            TradingMode::Paper => self.cancel_paper_order(order_id),
            TradingMode::Live => self.cancel_live_order(order_id).await,
        }
    }

    fn cancel_paper_order(&self, order_id: &str) -> bool {
        let mut state = self.state.lock();
        if !state.paper.cancel(order_id) {
            warn!(order_id, "Cannot cancel paper order: not found or already executed");
            return false;
        }
        state.transition(order_id, OrderStatus::Cancelled);
        info!(order_id, "Paper order cancelled");
        true
    }

    async fn cancel_live_order(&self, order_id: &str) -> bool {
        let variety = {
            let state = self.state.lock();
            state.orders.get(order_id).map(|o| o.request.variety.clone())
        };
        let Some(variety) = variety else {
            warn!(order_id, "Order not found in tracked orders");
            return false;
        };

        let result = retry_operation(&self.operations, "cancel_order", || {
            self.gateway.cancel_order(order_id, &variety)
        })
        .await;

        match result {
            Ok(true) => {
                self.state.lock().transition(order_id, OrderStatus::Cancelled);
                info!(order_id, "Order cancelled");
                true
            }
            Ok(false) => {
                warn!(order_id, "Broker declined cancel");
                false
            }
            Err(e) => {
                error!(order_id, error = %e, "Cancel failed");
                false
            }
        }
    }

    /// Open positions.
    ///
    /// Paper mode reads the in-memory book; live mode pulls the broker's
    /// position book, keeping non-zero rows.
    pub async fn get_positions(&self) -> Vec<Position> {
        match self.mode {
            TradingMode::Paper => self.state.lock().paper.positions(),
            TradingMode::Live => self.refresh_live_positions().await,
        }
    }

    async fn refresh_live_positions(&self) -> Vec<Position> {
        let book = retry_operation(&self.operations, "get_positions", || {
            self.gateway.get_positions()
        })
        .await;

        let entries = match book {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Failed to get live positions");
                return Vec::new();
            }
        };

        // flat rows only carry the P&L of positions closed today
        let (open, flat): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|entry| entry.net_quantity != 0);
        let positions: Vec<Position> = open.into_iter().map(Position::from).collect();

        let mut state = self.state.lock();
        state.live_positions = positions.iter().map(|p| (p.key(), p.clone())).collect();
        state.live_flat_pnl = flat.iter().map(|entry| entry.pnl).sum();
        positions
    }

    /// Place a target/stop pair protecting `position`.
    ///
    /// The stop is only placed once the target is accepted; a failed stop
    /// cancels the target.
    pub async fn place_oco_orders(
        &self,
        position: &Position,
        target_price: Decimal,
        stop_price: Decimal,
    ) -> bool {
        let action = position.exit_action();
        let quantity = position.abs_quantity();

        let mut target = OrderRequest::limit(
            position.symbol.clone(),
            position.token.clone(),
            position.exchange.clone(),
            action,
            quantity,
            target_price,
        );
        let mut stop = OrderRequest::stop_loss(
            position.symbol.clone(),
            position.token.clone(),
            position.exchange.clone(),
            action,
            quantity,
            stop_price,
            None,
        );
        for (order, tag) in [(&mut target, "TARGET"), (&mut stop, "STOP_LOSS")] {
            order.product.clone_from(&position.product);
            order.trade_id.clone_from(&position.trade_id);
            order.strategy_name.clone_from(&position.strategy_name);
            order.tag = Some(tag.to_string());
        }

        let validation = self
            .validator
            .validate_oco_orders(&target, &stop, position.quantity);
        if !validation.is_valid {
            error!(
                symbol = %position.symbol,
                reason = %validation.message,
                "OCO validation failed"
            );
            return false;
        }

        let target_response = self.place_order(&target).await;
        let Some(target_id) = target_response
            .order_id
            .clone()
            .filter(|_| target_response.is_success())
        else {
            error!(
                symbol = %position.symbol,
                message = %target_response.message,
                "Failed to place target order"
            );
            return false;
        };

        let stop_response = self.place_order(&stop).await;
        let Some(stop_id) = stop_response
            .order_id
            .clone()
            .filter(|_| stop_response.is_success())
        else {
            error!(
                symbol = %position.symbol,
                message = %stop_response.message,
                "Failed to place stop order, cancelling target"
            );
            if !self.cancel_order(&target_id).await {
                error!(order_id = %target_id, "Target order left unprotected; cancel failed");
            }
            return false;
        };

        let oco = OcoOrder {
            symbol: position.symbol.clone(),
            exchange: position.exchange.clone(),
            target_order_id: target_id.clone(),
            stop_order_id: stop_id.clone(),
            quantity,
            exit_action: action,
            target_price,
            stop_price,
            trade_id: position.trade_id.clone(),
            active: true,
            created_at: Utc::now(),
        };
        self.state.lock().oco_orders.insert(oco.key(), oco);
        info!(symbol = %position.symbol, target = %target_id, stop = %stop_id, "OCO orders placed");
        true
    }

    /// Last known status of an order.
    #[must_use]
    pub fn get_order_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.state.lock().orders.get(order_id).map(|o| o.status)
    }

    /// Orders not yet in a terminal state.
    #[must_use]
    pub fn get_active_orders(&self) -> HashMap<String, TrackedOrder> {
        self.state
            .lock()
            .orders
            .iter()
            .filter(|(_, o)| !o.status.is_terminal())
            .map(|(id, o)| (id.clone(), o.clone()))
            .collect()
    }

    /// Fills recorded so far, oldest first.
    #[must_use]
    pub fn get_execution_history(&self) -> Vec<TradeExecution> {
        self.state.lock().executions.clone()
    }

    /// OCO pairs keyed by `symbol:exchange`.
    #[must_use]
    pub fn get_oco_orders(&self) -> HashMap<String, OcoOrder> {
        self.state.lock().oco_orders.clone()
    }

    /// Current exposure.
    #[must_use]
    pub fn exposure_snapshot(&self) -> ExposureSnapshot {
        let state = self.state.lock();
        let positions = state.positions(self.mode);
        ExposureSnapshot {
            mode: self.mode,
            unrealized_pnl: positions.iter().map(|p| p.unrealized_pnl).sum(),
            realized_pnl: state.realized_pnl(self.mode),
            active_orders: state
                .orders
                .values()
                .filter(|o| !o.status.is_terminal())
                .count(),
            active_oco_orders: state.oco_orders.values().filter(|o| o.active).count(),
            positions,
            taken_at: Utc::now(),
        }
    }
}

fn execution_record(
    order_id: &str,
    order: &OrderRequest,
    quantity: u32,
    price: Decimal,
) -> TradeExecution {
    TradeExecution {
        order_id: order_id.to_string(),
        symbol: order.symbol.clone(),
        exchange: order.exchange.clone(),
        action: order.action,
        quantity,
        price,
        trade_id: order.trade_id.clone(),
        executed_at: Utc::now(),
    }
}

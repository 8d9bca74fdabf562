//! Position Monitor
//!
//! Owns the decision to close a trade. The [`OrderManager`] owns the
//! mechanics: every exit goes through [`OrderManager::place_order`].
//!
//! Each cycle refreshes leg prices from current positions, sweeps all open
//! trades if the daily loss limit is breached, and otherwise evaluates each
//! open trade in a fixed order:
//!
//! 1. target hit (`TARGET_HIT`)
//! 2. stop hit (`STOP_LOSS`)
//! 3. held too long (`TIME_EXIT`)
//!
//! Conditions are always published as [`MonitorEvent`]s; closing on them is
//! controlled by the per-condition `auto_close_*` switches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{CloseReason, OrderRequest, Trade};
use crate::observability::metrics;
use crate::order_manager::OrderManager;
use crate::retry::fallback::round_price;

const EVENT_CAPACITY: usize = 256;

/// Position monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionMonitorConfig {
    /// Target P&L for trades opened without one.
    pub default_target_pnl: Decimal,
    /// Stop-loss P&L for trades opened without one.
    pub default_stop_loss: Decimal,
    /// Daily P&L at or below which every open trade is closed.
    pub max_daily_loss: Decimal,
    /// Longest a trade may stay open.
    pub max_hold_secs: u64,
    /// Time between cycles.
    pub interval_ms: u64,
    /// Close on target hit.
    pub auto_close_on_target: bool,
    /// Close on stop hit.
    pub auto_close_on_stop: bool,
    /// Close after `max_hold_secs`.
    pub auto_close_on_timeout: bool,
    /// Place an OCO pair for each position of a newly added trade.
    pub auto_place_oco_orders: bool,
}

impl Default for PositionMonitorConfig {
    fn default() -> Self {
        Self {
            default_target_pnl: dec!(2000),
            default_stop_loss: dec!(-1000),
            max_daily_loss: dec!(-5000),
            max_hold_secs: 6 * 60 * 60,
            interval_ms: 30_000,
            auto_close_on_target: true,
            auto_close_on_stop: true,
            auto_close_on_timeout: true,
            auto_place_oco_orders: false,
        }
    }
}

/// A breached risk limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RiskAlert {
    /// Daily P&L at or below the limit.
    DailyLossLimitBreached {
        /// Daily P&L.
        daily_pnl: Decimal,
    },
    /// Trade held longer than allowed.
    PositionTimeout {
        /// Trade id.
        trade_id: String,
        /// Seconds held.
        held_secs: i64,
    },
    /// Trade P&L at or below its stop.
    StopLossTriggered {
        /// Trade id.
        trade_id: String,
        /// Current P&L.
        pnl: Decimal,
    },
    /// Trade P&L at or above its target.
    TargetHit {
        /// Trade id.
        trade_id: String,
        /// Current P&L.
        pnl: Decimal,
    },
}

/// Published on the monitor's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MonitorEvent {
    /// Trade P&L reached its target.
    TargetHit {
        /// Trade id.
        trade_id: String,
        /// Current P&L.
        pnl: Decimal,
    },
    /// Trade P&L reached its stop.
    StopLoss {
        /// Trade id.
        trade_id: String,
        /// Current P&L.
        pnl: Decimal,
    },
    /// Trade held past the limit.
    TimeExit {
        /// Trade id.
        trade_id: String,
        /// Seconds held.
        held_secs: i64,
    },
    /// Every leg exited; trade is closed.
    TradeClosed {
        /// Trade id.
        trade_id: String,
        /// Why it closed.
        reason: CloseReason,
        /// Realized P&L.
        pnl: Decimal,
    },
    /// Some leg exits failed; trade left open.
    CloseFailed {
        /// Trade id.
        trade_id: String,
        /// Requested reason.
        reason: CloseReason,
        /// Symbols whose exit failed.
        failed_legs: Vec<String>,
    },
    /// A risk limit was breached.
    RiskAlert(RiskAlert),
}

impl MonitorEvent {
    /// Event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TargetHit { .. } => "target_hit",
            Self::StopLoss { .. } => "stop_loss",
            Self::TimeExit { .. } => "time_exit",
            Self::TradeClosed { .. } => "trade_closed",
            Self::CloseFailed { .. } => "close_failed",
            Self::RiskAlert(_) => "risk_alert",
        }
    }
}

/// Performance view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSummary {
    /// Trades being monitored.
    pub monitored_trades: usize,
    /// Open trades.
    pub open_trades: usize,
    /// Unrealized P&L across open trades.
    pub total_unrealized_pnl: Decimal,
    /// Realized today plus open unrealized.
    pub daily_pnl: Decimal,
    /// Trades closed today.
    pub total_trades: u64,
    /// Closed with positive P&L.
    pub winning_trades: u64,
    /// Closed with zero or negative P&L.
    pub losing_trades: u64,
    /// `winning / total`.
    pub win_rate: Decimal,
    /// Highest realized P&L today.
    pub peak_pnl: Decimal,
    /// Largest fall from the peak.
    pub max_drawdown: Decimal,
}

#[derive(Debug, Default)]
struct MonitorState {
    trades: HashMap<String, Trade>,
    last_update: HashMap<String, DateTime<Utc>>,
    closing: HashSet<String>,
    realized_today: Decimal,
    total_trades: u64,
    winning_trades: u64,
    losing_trades: u64,
    peak_pnl: Decimal,
    max_drawdown: Decimal,
    shutdown: Option<CancellationToken>,
}

impl MonitorState {
    fn unrealized(&self) -> Decimal {
        self.trades
            .values()
            .filter(|t| t.is_open())
            .map(Trade::unrealized_pnl)
            .sum()
    }

    fn daily_pnl(&self) -> Decimal {
        self.realized_today + self.unrealized()
    }

    fn record_close(&mut self, pnl: Decimal) {
        self.total_trades += 1;
        self.realized_today += pnl;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }
        self.peak_pnl = self.peak_pnl.max(self.realized_today);
        self.max_drawdown = self.max_drawdown.max(self.peak_pnl - self.realized_today);
    }
}

struct LegExit {
    index: usize,
    order_id: String,
    price: Decimal,
}

/// Watches open trades and closes them on exit conditions.
pub struct PositionMonitor {
    orders: Arc<OrderManager>,
    config: PositionMonitorConfig,
    state: Mutex<MonitorState>,
    events: broadcast::Sender<MonitorEvent>,
}

impl std::fmt::Debug for PositionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PositionMonitor {
    /// Create a monitor closing trades through `orders`.
    #[must_use]
    pub fn new(orders: Arc<OrderManager>, config: PositionMonitorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            orders,
            config,
            state: Mutex::new(MonitorState::default()),
            events,
        }
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &PositionMonitorConfig {
        &self.config
    }

    /// Subscribe to monitor events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Start monitoring a trade.
    pub async fn add_trade(&self, trade: Trade) {
        let trade_id = trade.id.clone();
        {
            let mut state = self.state.lock();
            state.last_update.insert(trade_id.clone(), Utc::now());
            state.trades.insert(trade_id.clone(), trade.clone());
            metrics::update_open_trades(state.trades.values().filter(|t| t.is_open()).count());
        }
        info!(trade_id = %trade_id, strategy = %trade.strategy_name, "Trade added for monitoring");

        if self.config.auto_place_oco_orders {
            self.place_automatic_oco_orders(&trade).await;
        }
    }

    /// Stop monitoring a trade.
    pub fn remove_trade(&self, trade_id: &str) -> Option<Trade> {
        let mut state = self.state.lock();
        state.last_update.remove(trade_id);
        let removed = state.trades.remove(trade_id);
        if removed.is_some() {
            info!(trade_id, "Trade removed from monitoring");
        }
        removed
    }

    /// Snapshot of a monitored trade.
    #[must_use]
    pub fn get_trade(&self, trade_id: &str) -> Option<Trade> {
        self.state.lock().trades.get(trade_id).cloned()
    }

    /// Snapshot of open trades.
    #[must_use]
    pub fn open_trades(&self) -> Vec<Trade> {
        self.state
            .lock()
            .trades
            .values()
            .filter(|t| t.is_open())
            .cloned()
            .collect()
    }

    /// Set leg prices by symbol, then evaluate the trade's exit conditions.
    pub async fn update_trade_prices(&self, trade_id: &str, prices: &HashMap<String, Decimal>) {
        let snapshot = {
            let mut state = self.state.lock();
            let Some(trade) = state.trades.get_mut(trade_id).filter(|t| t.is_open()) else {
                return;
            };
            for leg in &mut trade.legs {
                if let Some(price) = prices.get(&leg.symbol) {
                    leg.current_price = *price;
                }
            }
            let snapshot = trade.clone();
            state.last_update.insert(trade_id.to_string(), Utc::now());
            snapshot
        };
        self.evaluate_exit(&snapshot).await;
    }

    /// Current P&L of a trade: unrealized while open, realized once closed.
    #[must_use]
    pub fn get_trade_pnl(&self, trade_id: &str) -> Option<Decimal> {
        self.state.lock().trades.get(trade_id).map(Trade::current_pnl)
    }

    /// Realized P&L since the last reset plus unrealized P&L of open trades.
    #[must_use]
    pub fn daily_pnl(&self) -> Decimal {
        self.state.lock().daily_pnl()
    }

    /// Breached limits, daily loss first.
    #[must_use]
    pub fn check_risk_limits(&self) -> Vec<RiskAlert> {
        let state = self.state.lock();
        let mut alerts = Vec::new();

        let daily_pnl = state.daily_pnl();
        if daily_pnl <= self.config.max_daily_loss {
            alerts.push(RiskAlert::DailyLossLimitBreached { daily_pnl });
        }

        let now = Utc::now();
        let mut open: Vec<&Trade> = state.trades.values().filter(|t| t.is_open()).collect();
        open.sort_by(|a, b| a.id.cmp(&b.id));
        for trade in open {
            let held_secs = (now - trade.entry_time).num_seconds();
            if held_secs > self.max_hold_secs() {
                alerts.push(RiskAlert::PositionTimeout {
                    trade_id: trade.id.clone(),
                    held_secs,
                });
            }
            let pnl = trade.current_pnl();
            if pnl <= trade.stop_loss_pnl {
                alerts.push(RiskAlert::StopLossTriggered {
                    trade_id: trade.id.clone(),
                    pnl,
                });
            }
            if pnl >= trade.target_pnl {
                alerts.push(RiskAlert::TargetHit {
                    trade_id: trade.id.clone(),
                    pnl,
                });
            }
        }
        alerts
    }

    fn max_hold_secs(&self) -> i64 {
        i64::try_from(self.config.max_hold_secs).unwrap_or(i64::MAX)
    }

    /// Close a trade with one MARKET exit per leg.
    ///
    /// The trade is marked closed only if every exit is accepted. Legs that
    /// already have an exit order are not resubmitted. Returns false for
    /// unknown, closed, or currently closing trades.
    pub async fn close_trade(&self, trade_id: &str, reason: CloseReason) -> bool {
        let trade = {
            let mut state = self.state.lock();
            let Some(trade) = state.trades.get(trade_id) else {
                warn!(trade_id, "Trade not found for closing");
                return false;
            };
            if !trade.is_open() {
                warn!(trade_id, "Trade is not open, cannot close");
                return false;
            }
            let trade = trade.clone();
            if !state.closing.insert(trade_id.to_string()) {
                warn!(trade_id, "Trade is already closing");
                return false;
            }
            trade
        };

        let mut exits = Vec::new();
        let mut failed_legs = Vec::new();
        for (index, leg) in trade.legs.iter().enumerate() {
            if leg.exit_order_id.is_some() {
                continue;
            }
            let mut exit = OrderRequest::market(
                leg.symbol.clone(),
                leg.token.clone(),
                leg.exchange.clone(),
                leg.action.opposite(),
                leg.quantity,
            )
            .with_trade(trade.id.clone(), index)
            .with_strategy(trade.strategy_name.clone());
            exit.tag = Some(format!("EXIT_{reason}"));

            let response = self.orders.place_order(&exit).await;
            match response.order_id.clone().filter(|_| response.is_success()) {
                Some(order_id) => {
                    info!(
                        trade_id,
                        symbol = %leg.symbol,
                        order_id = %order_id,
                        "Exit order placed"
                    );
                    let mark = (leg.current_price > Decimal::ZERO).then_some(leg.current_price);
                    exits.push(LegExit {
                        index,
                        order_id,
                        price: response.average_price.or(mark).unwrap_or(leg.entry_price),
                    });
                }
                None => {
                    error!(
                        trade_id,
                        symbol = %leg.symbol,
                        message = %response.message,
                        "Failed to place exit order"
                    );
                    failed_legs.push(leg.symbol.clone());
                }
            }
        }

        let mut state = self.state.lock();
        state.closing.remove(trade_id);
        let Some(stored) = state.trades.get_mut(trade_id) else {
            warn!(trade_id, "Trade removed while closing");
            return false;
        };
        for exit in exits {
            if let Some(leg) = stored.legs.get_mut(exit.index) {
                leg.exit_order_id = Some(exit.order_id);
                leg.exit_price = Some(exit.price);
            }
        }

        if !failed_legs.is_empty() {
            error!(
                trade_id,
                reason = %reason,
                failed_legs = ?failed_legs,
                "Inconsistent partial close: trade left open for operator attention"
            );
            metrics::record_trade_close(reason.as_str(), "failed");
            self.emit(MonitorEvent::CloseFailed {
                trade_id: trade_id.to_string(),
                reason,
                failed_legs,
            });
            return false;
        }

        stored.mark_closed(reason);
        let pnl = stored.realized_pnl;
        state.record_close(pnl);
        metrics::record_trade_close(reason.as_str(), "closed");
        metrics::update_open_trades(state.trades.values().filter(|t| t.is_open()).count());
        info!(trade_id, reason = %reason, pnl = %pnl, "Trade closed");
        self.emit(MonitorEvent::TradeClosed {
            trade_id: trade_id.to_string(),
            reason,
            pnl,
        });
        true
    }

    /// Close every open trade. Returns how many closed.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let mut trade_ids: Vec<String> = self
            .state
            .lock()
            .trades
            .values()
            .filter(|t| t.is_open())
            .map(|t| t.id.clone())
            .collect();
        trade_ids.sort();

        let mut closed = 0;
        for trade_id in trade_ids {
            if self.close_trade(&trade_id, reason).await {
                closed += 1;
            }
        }
        closed
    }

    /// Performance summary.
    #[must_use]
    pub fn position_summary(&self) -> PositionSummary {
        let state = self.state.lock();
        let win_rate = if state.total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(state.winning_trades) / Decimal::from(state.total_trades)
        };
        PositionSummary {
            monitored_trades: state.trades.len(),
            open_trades: state.trades.values().filter(|t| t.is_open()).count(),
            total_unrealized_pnl: state.unrealized(),
            daily_pnl: state.daily_pnl(),
            total_trades: state.total_trades,
            winning_trades: state.winning_trades,
            losing_trades: state.losing_trades,
            win_rate,
            peak_pnl: state.peak_pnl,
            max_drawdown: state.max_drawdown,
        }
    }

    /// Reset daily counters.
    pub fn reset_daily_metrics(&self) {
        let mut state = self.state.lock();
        state.realized_today = Decimal::ZERO;
        state.total_trades = 0;
        state.winning_trades = 0;
        state.losing_trades = 0;
        state.peak_pnl = Decimal::ZERO;
        state.max_drawdown = Decimal::ZERO;
        info!("Daily metrics reset");
    }

    /// One monitoring cycle.
    pub async fn run_cycle(&self) {
        self.refresh_prices().await;

        let alerts = self.check_risk_limits();
        let breached = alerts
            .iter()
            .any(|a| matches!(a, RiskAlert::DailyLossLimitBreached { .. }));
        for alert in alerts {
            warn!(alert = ?alert, "Risk alert");
            self.emit(MonitorEvent::RiskAlert(alert));
        }

        if breached {
            error!(
                daily_pnl = %self.daily_pnl(),
                limit = %self.config.max_daily_loss,
                "Daily loss limit breached, closing all trades"
            );
            self.close_all(CloseReason::DailyLossLimit).await;
        } else {
            for trade in self.open_trades() {
                self.evaluate_exit(&trade).await;
            }
        }

        metrics::update_daily_pnl(self.daily_pnl().to_f64().unwrap_or(0.0));
    }

    async fn refresh_prices(&self) {
        let positions = self.orders.get_positions().await;
        let ltps: HashMap<String, Decimal> = positions
            .iter()
            .filter(|p| p.ltp > Decimal::ZERO)
            .map(|p| (p.key(), p.ltp))
            .collect();
        if ltps.is_empty() {
            return;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Utc::now();
        for trade in state.trades.values_mut().filter(|t| t.is_open()) {
            for leg in &mut trade.legs {
                if let Some(ltp) = ltps.get(&leg.position_key()) {
                    leg.current_price = *ltp;
                }
            }
            state.last_update.insert(trade.id.clone(), now);
        }
    }

    async fn evaluate_exit(&self, trade: &Trade) {
        let pnl = trade.current_pnl();
        let held_secs = (Utc::now() - trade.entry_time).num_seconds();

        let conditions = [
            (
                pnl >= trade.target_pnl,
                MonitorEvent::TargetHit {
                    trade_id: trade.id.clone(),
                    pnl,
                },
                self.config.auto_close_on_target,
                CloseReason::TargetHit,
            ),
            (
                pnl <= trade.stop_loss_pnl,
                MonitorEvent::StopLoss {
                    trade_id: trade.id.clone(),
                    pnl,
                },
                self.config.auto_close_on_stop,
                CloseReason::StopLoss,
            ),
            (
                held_secs > self.max_hold_secs(),
                MonitorEvent::TimeExit {
                    trade_id: trade.id.clone(),
                    held_secs,
                },
                self.config.auto_close_on_timeout,
                CloseReason::TimeExit,
            ),
        ];

        for (hit, event, auto_close, reason) in conditions {
            if !hit {
                continue;
            }
            info!(trade_id = %trade.id, event = event.name(), pnl = %pnl, "Exit condition met");
            self.emit(event);
            if auto_close {
                self.close_trade(&trade.id, reason).await;
                return;
            }
        }
    }

    async fn place_automatic_oco_orders(&self, trade: &Trade) {
        for position in self.orders.get_positions().await {
            if position.trade_id.as_deref() != Some(trade.id.as_str()) {
                continue;
            }
            let size = Decimal::from(position.quantity.unsigned_abs());
            if size.is_zero() {
                continue;
            }
            let (target, stop) = if position.is_long() {
                (
                    position.average_price + trade.target_pnl / size,
                    position.average_price + trade.stop_loss_pnl / size,
                )
            } else {
                (
                    position.average_price - trade.target_pnl / size,
                    position.average_price - trade.stop_loss_pnl / size,
                )
            };
            if self
                .orders
                .place_oco_orders(&position, round_price(target), round_price(stop))
                .await
            {
                info!(
                    trade_id = %trade.id,
                    symbol = %position.symbol,
                    "Automatic OCO orders placed"
                );
            } else {
                warn!(
                    trade_id = %trade.id,
                    symbol = %position.symbol,
                    "Failed to place automatic OCO orders"
                );
            }
        }
    }

    /// Spawn the monitoring loop. No-op if it is already running.
    pub fn start_monitoring(self: &Arc<Self>) {
        let token = {
            let mut state = self.state.lock();
            if state.shutdown.is_some() {
                warn!("Position monitoring already running");
                return;
            }
            let token = CancellationToken::new();
            state.shutdown = Some(token.clone());
            token
        };

        let monitor = Arc::clone(self);
        let period = Duration::from_millis(self.config.interval_ms.max(1));

        tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "Position monitoring started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => monitor.run_cycle().await,
                    () = token.cancelled() => break,
                }
            }
            info!("Position monitoring stopped");
        });
    }

    /// Stop the monitoring loop.
    pub fn stop_monitoring(&self) {
        if let Some(token) = self.state.lock().shutdown.take() {
            token.cancel();
        }
    }

    /// Whether the monitoring loop is running.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.state.lock().shutdown.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::models::{OptionType, OrderAction, TradeLeg, TradeStatus};
    use crate::order_manager::{OrderManagerConfig, TradingMode};
    use crate::validation::ValidationConfig;

    fn setup(
        config: PositionMonitorConfig,
    ) -> (Arc<MockGateway>, Arc<OrderManager>, PositionMonitor) {
        let gateway = Arc::new(MockGateway::new());
        let orders = Arc::new(OrderManager::new(
            gateway.clone(),
            OrderManagerConfig {
                mode: TradingMode::Paper,
                validation: ValidationConfig {
                    enforce_market_hours: false,
                    ..ValidationConfig::default()
                },
                ..OrderManagerConfig::default()
            },
        ));
        let monitor = PositionMonitor::new(Arc::clone(&orders), config);
        (gateway, orders, monitor)
    }

    fn leg(symbol: &str, token: &str, action: OrderAction, entry: Decimal) -> TradeLeg {
        TradeLeg {
            symbol: symbol.to_string(),
            token: token.to_string(),
            exchange: "NFO".to_string(),
            strike: dec!(50000),
            option_type: OptionType::Call,
            action,
            quantity: 35,
            entry_price: entry,
            current_price: entry,
            exit_order_id: None,
            exit_price: None,
        }
    }

    fn trade(id: &str, target: Decimal, stop: Decimal) -> Trade {
        Trade::new(
            id,
            "long_call",
            vec![leg("BANKNIFTY24DEC50000CE", "12345", OrderAction::Buy, dec!(100))],
            target,
            stop,
        )
    }

    fn prices(price: Decimal) -> HashMap<String, Decimal> {
        HashMap::from([("BANKNIFTY24DEC50000CE".to_string(), price)])
    }

    #[tokio::test]
    async fn price_update_tracks_pnl() {
        let (_, _, monitor) = setup(PositionMonitorConfig::default());
        monitor.add_trade(trade("T1", dec!(2000), dec!(-1000))).await;
        monitor.update_trade_prices("T1", &prices(dec!(110))).await;
        assert_eq!(monitor.get_trade_pnl("T1"), Some(dec!(350)));
        assert_eq!(monitor.get_trade_pnl("missing"), None);
    }

    #[tokio::test]
    async fn stop_hit_closes_with_exit_orders() {
        let (gateway, orders, monitor) = setup(PositionMonitorConfig::default());
        gateway.set_ltp("BANKNIFTY24DEC50000CE", dec!(60));
        let mut events = monitor.subscribe();

        monitor.add_trade(trade("T1", dec!(2000), dec!(-1000))).await;
        monitor.update_trade_prices("T1", &prices(dec!(60))).await;

        let closed = monitor.get_trade("T1").unwrap();
        assert_eq!(closed.status, TradeStatus::Closed);
        assert_eq!(closed.close_reason, Some(CloseReason::StopLoss));
        assert!(closed.legs[0].exit_order_id.is_some());
        assert_eq!(orders.get_execution_history()[0].action, OrderAction::Sell);

        assert_eq!(events.recv().await.unwrap().name(), "stop_loss");
        assert_eq!(events.recv().await.unwrap().name(), "trade_closed");
    }

    #[tokio::test]
    async fn condition_reported_without_auto_close() {
        let (_, _, monitor) = setup(PositionMonitorConfig {
            auto_close_on_target: false,
            ..PositionMonitorConfig::default()
        });
        let mut events = monitor.subscribe();
        monitor.add_trade(trade("T1", dec!(300), dec!(-1000))).await;
        monitor.update_trade_prices("T1", &prices(dec!(110))).await;

        assert!(monitor.get_trade("T1").unwrap().is_open());
        assert_eq!(events.recv().await.unwrap().name(), "target_hit");
    }

    #[tokio::test]
    async fn time_exit_after_max_hold() {
        let (gateway, _, monitor) = setup(PositionMonitorConfig {
            max_hold_secs: 60,
            ..PositionMonitorConfig::default()
        });
        gateway.set_ltp("BANKNIFTY24DEC50000CE", dec!(100));
        let mut old = trade("T1", dec!(2000), dec!(-1000));
        old.entry_time = Utc::now() - chrono::Duration::seconds(120);
        monitor.add_trade(old).await;

        assert!(matches!(
            monitor.check_risk_limits().as_slice(),
            [RiskAlert::PositionTimeout { .. }]
        ));
        monitor.run_cycle().await;
        assert_eq!(
            monitor.get_trade("T1").unwrap().close_reason,
            Some(CloseReason::TimeExit)
        );
    }

    #[tokio::test]
    async fn failed_leg_leaves_trade_open_and_retry_skips_exited_legs() {
        let (gateway, orders, monitor) = setup(PositionMonitorConfig::default());
        gateway.set_ltp("BANKNIFTY24DEC50000CE", dec!(100));
        let two_legs = Trade::new(
            "T1",
            "strangle",
            vec![
                leg("BANKNIFTY24DEC50000CE", "12345", OrderAction::Sell, dec!(100)),
                // token too short: exit fails validation
                leg("BANKNIFTY24DEC49000PE", "1", OrderAction::Sell, dec!(100)),
            ],
            dec!(2000),
            dec!(-1000),
        );
        monitor.add_trade(two_legs).await;

        assert!(!monitor.close_trade("T1", CloseReason::Manual).await);
        let trade = monitor.get_trade("T1").unwrap();
        assert!(trade.is_open());
        assert!(trade.legs[0].exit_order_id.is_some());
        assert!(trade.legs[1].exit_order_id.is_none());

        assert!(!monitor.close_trade("T1", CloseReason::Manual).await);
        // the call leg is not exited twice
        assert_eq!(orders.get_execution_history().len(), 1);
    }

    #[tokio::test]
    async fn summary_tracks_wins_and_drawdown() {
        let (gateway, _, monitor) = setup(PositionMonitorConfig::default());
        monitor.add_trade(trade("W", dec!(5000), dec!(-5000))).await;
        monitor.add_trade(trade("L", dec!(5000), dec!(-5000))).await;

        // paper exits sell at LTP less 0.2% slippage
        gateway.set_ltp("BANKNIFTY24DEC50000CE", dec!(120));
        assert!(monitor.close_trade("W", CloseReason::Manual).await);
        gateway.set_ltp("BANKNIFTY24DEC50000CE", dec!(90));
        assert!(monitor.close_trade("L", CloseReason::Manual).await);

        assert_eq!(monitor.get_trade_pnl("W"), Some(dec!(691.60)));
        assert_eq!(monitor.get_trade_pnl("L"), Some(dec!(-356.30)));
        let summary = monitor.position_summary();
        assert_eq!(summary.total_trades, 2);
        assert_eq!(summary.winning_trades, 1);
        assert_eq!(summary.losing_trades, 1);
        assert_eq!(summary.win_rate, dec!(0.5));
        assert_eq!(summary.peak_pnl, dec!(691.60));
        assert_eq!(summary.max_drawdown, dec!(356.30));
        assert_eq!(summary.daily_pnl, dec!(335.30));
        assert_eq!(summary.open_trades, 0);

        monitor.reset_daily_metrics();
        assert_eq!(monitor.position_summary().total_trades, 0);
        assert_eq!(monitor.daily_pnl(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn auto_oco_brackets_trade_positions() {
        let (gateway, orders, monitor) = setup(PositionMonitorConfig {
            auto_place_oco_orders: true,
            ..PositionMonitorConfig::default()
        });
        gateway.set_ltp("BANKNIFTY24DEC50000CE", dec!(100));
        let entry = OrderRequest::limit(
            "BANKNIFTY24DEC50000CE",
            "12345",
            "NFO",
            OrderAction::Buy,
            35,
            dec!(100),
        )
        .with_trade("T1", 0);
        orders.place_order(&entry).await;

        // 350 / 35 = 10 above, -350 / 35 = 10 below
        monitor.add_trade(trade("T1", dec!(350), dec!(-350))).await;
        let oco = orders.get_oco_orders().remove("BANKNIFTY24DEC50000CE:NFO").unwrap();
        assert_eq!(oco.target_price, dec!(110));
        assert_eq!(oco.stop_price, dec!(90));
    }
}

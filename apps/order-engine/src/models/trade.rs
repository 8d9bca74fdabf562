//! Strategy-level trades and the signals that open them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::OrderAction;

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    /// Call.
    #[serde(rename = "CE")]
    Call,
    /// Put.
    #[serde(rename = "PE")]
    Put,
}

/// Trade lifecycle status. CLOSED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// Legs open.
    Open,
    /// All legs exited.
    Closed,
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    /// Target P&L reached.
    TargetHit,
    /// Stop-loss P&L reached.
    StopLoss,
    /// Maximum hold time exceeded.
    TimeExit,
    /// Daily loss limit breached.
    DailyLossLimit,
    /// Operator request.
    Manual,
    /// Emergency shutdown.
    Emergency,
}

impl CloseReason {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TargetHit => "TARGET_HIT",
            Self::StopLoss => "STOP_LOSS",
            Self::TimeExit => "TIME_EXIT",
            Self::DailyLossLimit => "DAILY_LOSS_LIMIT",
            Self::Manual => "MANUAL",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instrument of a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLeg {
    /// Trading symbol.
    pub symbol: String,
    /// Instrument token.
    pub token: String,
    /// Exchange segment.
    pub exchange: String,
    /// Strike.
    pub strike: Decimal,
    /// Call or put.
    pub option_type: OptionType,
    /// Entry side.
    pub action: OrderAction,
    /// Quantity in units.
    pub quantity: u32,
    /// Entry fill price.
    pub entry_price: Decimal,
    /// Latest mark.
    pub current_price: Decimal,
    /// Exit order, once submitted and accepted.
    #[serde(default)]
    pub exit_order_id: Option<String>,
    /// Exit fill price.
    #[serde(default)]
    pub exit_price: Option<Decimal>,
}

impl TradeLeg {
    /// Unrealized P&L at `current_price`; zero until a mark is known.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        if self.current_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let quantity = Decimal::from(self.quantity);
        match self.action {
            OrderAction::Buy => (self.current_price - self.entry_price) * quantity,
            OrderAction::Sell => (self.entry_price - self.current_price) * quantity,
        }
    }

    /// Realized P&L once an exit price is known.
    #[must_use]
    pub fn realized_pnl(&self) -> Option<Decimal> {
        let exit = self.exit_price?;
        let quantity = Decimal::from(self.quantity);
        Some(match self.action {
            OrderAction::Buy => (exit - self.entry_price) * quantity,
            OrderAction::Sell => (self.entry_price - exit) * quantity,
        })
    }

    /// Book key of the position this leg trades.
    #[must_use]
    pub fn position_key(&self) -> String {
        format!("{}:{}", self.symbol, self.exchange)
    }
}

/// A strategy-level aggregate of legs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Trade id.
    pub id: String,
    /// Originating strategy.
    pub strategy_name: String,
    /// Legs.
    pub legs: Vec<TradeLeg>,
    /// Close when P&L reaches this.
    pub target_pnl: Decimal,
    /// Close when P&L falls to this (negative).
    pub stop_loss_pnl: Decimal,
    /// Lifecycle status.
    pub status: TradeStatus,
    /// Entry time.
    pub entry_time: DateTime<Utc>,
    /// Exit time.
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    /// Why the trade was closed.
    #[serde(default)]
    pub close_reason: Option<CloseReason>,
    /// P&L locked in at close.
    #[serde(default)]
    pub realized_pnl: Decimal,
}

impl Trade {
    /// Open trade entered now.
    pub fn new(
        id: impl Into<String>,
        strategy_name: impl Into<String>,
        legs: Vec<TradeLeg>,
        target_pnl: Decimal,
        stop_loss_pnl: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            strategy_name: strategy_name.into(),
            legs,
            target_pnl,
            stop_loss_pnl,
            status: TradeStatus::Open,
            entry_time: Utc::now(),
            exit_time: None,
            close_reason: None,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Sum of leg unrealized P&L.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        self.legs.iter().map(TradeLeg::unrealized_pnl).sum()
    }

    /// Realized P&L when closed, unrealized otherwise.
    #[must_use]
    pub fn current_pnl(&self) -> Decimal {
        match self.status {
            TradeStatus::Closed => self.realized_pnl,
            TradeStatus::Open => self.unrealized_pnl(),
        }
    }

    /// Still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Mark the trade closed. Realized P&L comes from leg exit prices, falling
    /// back to the last mark for legs without one.
    pub fn mark_closed(&mut self, reason: CloseReason) {
        self.realized_pnl = self
            .legs
            .iter()
            .map(|leg| leg.realized_pnl().unwrap_or_else(|| leg.unrealized_pnl()))
            .sum();
        self.status = TradeStatus::Closed;
        self.close_reason = Some(reason);
        self.exit_time = Some(Utc::now());
    }
}

/// One leg of a strategy signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalLeg {
    /// Trading symbol.
    pub symbol: String,
    /// Instrument token.
    pub token: String,
    /// Exchange segment.
    pub exchange: String,
    /// Strike.
    pub strike: Decimal,
    /// Call or put.
    pub option_type: OptionType,
    /// Entry side.
    pub action: OrderAction,
    /// Quantity in units.
    pub quantity: u32,
    /// Limit price; `None` places a market order.
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// A trade-shaped signal from the strategy layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Originating strategy.
    pub strategy_name: String,
    /// Legs to enter, in order.
    pub legs: Vec<SignalLeg>,
    /// Target P&L.
    pub target_pnl: Decimal,
    /// Stop-loss P&L (negative).
    pub stop_loss_pnl: Decimal,
}

//! Net positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderAction;

/// A net position in one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Trading symbol.
    pub symbol: String,
    /// Instrument token.
    pub token: String,
    /// Exchange segment.
    pub exchange: String,
    /// Product type.
    pub product: String,
    /// Signed net quantity (positive = long).
    pub quantity: i64,
    /// Volume-weighted average price.
    pub average_price: Decimal,
    /// Last traded price.
    pub ltp: Decimal,
    /// Realized P&L.
    pub realized_pnl: Decimal,
    /// Unrealized P&L at `ltp`.
    pub unrealized_pnl: Decimal,
    /// Owning trade.
    pub trade_id: Option<String>,
    /// Originating strategy.
    pub strategy_name: Option<String>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Create a position at `average_price`, marked at the same price.
    pub fn new(
        symbol: impl Into<String>,
        token: impl Into<String>,
        exchange: impl Into<String>,
        quantity: i64,
        average_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            token: token.into(),
            exchange: exchange.into(),
            product: "MIS".to_string(),
            quantity,
            average_price,
            ltp: average_price,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            trade_id: None,
            strategy_name: None,
            updated_at: Utc::now(),
        }
    }

    /// Book key, `symbol:exchange`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.symbol, self.exchange)
    }

    /// Mark to a new price and recompute unrealized P&L.
    pub fn update_ltp(&mut self, ltp: Decimal) {
        self.ltp = ltp;
        self.unrealized_pnl = Decimal::from(self.quantity) * (ltp - self.average_price);
        self.updated_at = Utc::now();
    }

    /// Realized plus unrealized.
    #[must_use]
    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl
    }

    /// Long position.
    #[must_use]
    pub const fn is_long(&self) -> bool {
        self.quantity > 0
    }

    /// Unsigned size, saturating at `u32::MAX`.
    #[must_use]
    pub fn abs_quantity(&self) -> u32 {
        u32::try_from(self.quantity.unsigned_abs()).unwrap_or(u32::MAX)
    }

    /// Side that closes this position.
    #[must_use]
    pub const fn exit_action(&self) -> OrderAction {
        if self.is_long() {
            OrderAction::Sell
        } else {
            OrderAction::Buy
        }
    }

    /// Check identity and sizing fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty()
            || self.token.trim().is_empty()
            || self.exchange.trim().is_empty()
        {
            return Err("Position requires symbol, token and exchange".to_string());
        }
        if self.quantity == 0 {
            return Err("Position quantity cannot be zero".to_string());
        }
        if self.average_price <= Decimal::ZERO {
            return Err("Position average price must be positive".to_string());
        }
        Ok(())
    }
}

/// A row of the broker's position book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionBookEntry {
    /// Trading symbol.
    pub symbol: String,
    /// Instrument token.
    pub token: String,
    /// Exchange segment.
    pub exchange: String,
    /// Product type.
    #[serde(default)]
    pub product: String,
    /// Signed net quantity.
    pub net_quantity: i64,
    /// Average price.
    pub average_price: Decimal,
    /// Last traded price.
    pub ltp: Decimal,
    /// Broker-reported P&L.
    #[serde(default)]
    pub pnl: Decimal,
}

impl From<PositionBookEntry> for Position {
    fn from(entry: PositionBookEntry) -> Self {
        let mut position = Self::new(
            entry.symbol,
            entry.token,
            entry.exchange,
            entry.net_quantity,
            entry.average_price,
        );
        if !entry.product.is_empty() {
            position.product = entry.product;
        }
        position.update_ltp(entry.ltp);
        position
    }
}

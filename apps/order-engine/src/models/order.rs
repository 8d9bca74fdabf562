//! Order requests and broker responses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::OrderStatus;
use crate::error::ErrorCode;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderAction {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl OrderAction {
    /// The opposite side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// +1 for BUY, -1 for SELL.
    #[must_use]
    pub const fn sign(&self) -> i64 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Market order.
    #[serde(rename = "MARKET")]
    Market,
    /// Limit order.
    #[serde(rename = "LIMIT")]
    Limit,
    /// Stop-loss limit order.
    #[serde(rename = "SL")]
    StopLoss,
    /// Stop-loss market order.
    #[serde(rename = "SL-M")]
    StopLossMarket,
}

impl OrderKind {
    /// Whether a trigger price is required.
    #[must_use]
    pub const fn requires_trigger(&self) -> bool {
        matches!(self, Self::StopLoss | Self::StopLossMarket)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::StopLoss => write!(f, "SL"),
            Self::StopLossMarket => write!(f, "SL-M"),
        }
    }
}

/// Order validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Validity {
    /// Valid for the trading day.
    #[default]
    Day,
    /// Immediate or cancel.
    Ioc,
    /// Good till date.
    Gtd,
}

fn default_product() -> String {
    "MIS".to_string()
}

fn default_variety() -> String {
    "NORMAL".to_string()
}

/// An order intent.
///
/// The retry engine never mutates a submitted request; it works on a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading symbol.
    pub symbol: String,
    /// Instrument token.
    pub token: String,
    /// Exchange segment.
    pub exchange: String,
    /// Side.
    pub action: OrderAction,
    /// Order kind.
    #[serde(rename = "order_type")]
    pub kind: OrderKind,
    /// Quantity in units (a multiple of the lot size).
    pub quantity: u32,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Stop trigger price.
    pub trigger_price: Option<Decimal>,
    /// Validity.
    #[serde(default)]
    pub validity: Validity,
    /// Product type.
    #[serde(default = "default_product")]
    pub product: String,
    /// Broker order variety, needed again on cancel.
    #[serde(default = "default_variety")]
    pub variety: String,
    /// Quantity disclosed to the market (0 = all).
    #[serde(default)]
    pub disclosed_quantity: u32,
    /// Free-form tag.
    #[serde(default)]
    pub tag: Option<String>,
    /// Owning trade.
    #[serde(default)]
    pub trade_id: Option<String>,
    /// Originating strategy.
    #[serde(default)]
    pub strategy_name: Option<String>,
    /// Leg position within the trade.
    #[serde(default)]
    pub leg_index: Option<usize>,
    /// Parent order, for remainders and exits.
    #[serde(default)]
    pub parent_order_id: Option<String>,
}

impl OrderRequest {
    /// Create a market order.
    pub fn market(
        symbol: impl Into<String>,
        token: impl Into<String>,
        exchange: impl Into<String>,
        action: OrderAction,
        quantity: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            token: token.into(),
            exchange: exchange.into(),
            action,
            kind: OrderKind::Market,
            quantity,
            price: None,
            trigger_price: None,
            validity: Validity::Day,
            product: default_product(),
            variety: default_variety(),
            disclosed_quantity: 0,
            tag: None,
            trade_id: None,
            strategy_name: None,
            leg_index: None,
            parent_order_id: None,
        }
    }

    /// Create a limit order.
    pub fn limit(
        symbol: impl Into<String>,
        token: impl Into<String>,
        exchange: impl Into<String>,
        action: OrderAction,
        quantity: u32,
        price: Decimal,
    ) -> Self {
        let mut order = Self::market(symbol, token, exchange, action, quantity);
        order.kind = OrderKind::Limit;
        order.price = Some(price);
        order
    }

    /// Create a stop-loss order. A `price` makes it SL, otherwise SL-M.
    pub fn stop_loss(
        symbol: impl Into<String>,
        token: impl Into<String>,
        exchange: impl Into<String>,
        action: OrderAction,
        quantity: u32,
        trigger_price: Decimal,
        price: Option<Decimal>,
    ) -> Self {
        let mut order = Self::market(symbol, token, exchange, action, quantity);
        order.kind = if price.is_some() {
            OrderKind::StopLoss
        } else {
            OrderKind::StopLossMarket
        };
        order.price = price;
        order.trigger_price = Some(trigger_price);
        order
    }

    /// Attach trade linkage.
    #[must_use]
    pub fn with_trade(mut self, trade_id: impl Into<String>, leg_index: usize) -> Self {
        self.trade_id = Some(trade_id.into());
        self.leg_index = Some(leg_index);
        self
    }

    /// Attach the originating strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy_name: impl Into<String>) -> Self {
        self.strategy_name = Some(strategy_name.into());
        self
    }

    /// Key of the position this order trades.
    #[must_use]
    pub fn position_key(&self) -> String {
        format!("{}:{}", self.symbol, self.exchange)
    }

    /// Check the order's own parameters.
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), String> {
        if self.exchange.trim().is_empty() {
            return Err("Exchange is required".to_string());
        }
        if self.symbol.trim().is_empty() {
            return Err("Trading symbol is required".to_string());
        }
        if self.token.trim().is_empty() {
            return Err("Symbol token is required".to_string());
        }
        if self.quantity == 0 {
            return Err("Quantity must be positive".to_string());
        }
        if self.kind == OrderKind::Limit && !self.price.is_some_and(|p| p > Decimal::ZERO) {
            return Err("Price is required for LIMIT orders".to_string());
        }
        if self.kind.requires_trigger() && !self.trigger_price.is_some_and(|p| p > Decimal::ZERO)
        {
            return Err("Trigger price is required for stop-loss orders".to_string());
        }
        Ok(())
    }
}

/// Result of a placement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Broker order id, present only on acceptance.
    pub order_id: Option<String>,
    /// Reported status.
    pub status: OrderStatus,
    /// Human-readable message.
    pub message: String,
    /// Error code, when the attempt failed.
    pub error_code: Option<ErrorCode>,
    /// Response time.
    pub timestamp: DateTime<Utc>,
    /// Quantity filled so far.
    #[serde(default)]
    pub filled_quantity: u32,
    /// Quantity still working.
    #[serde(default)]
    pub pending_quantity: u32,
    /// Average fill price.
    #[serde(default)]
    pub average_price: Option<Decimal>,
}

impl OrderResponse {
    /// Accepted response.
    pub fn accepted(
        order_id: impl Into<String>,
        status: OrderStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            order_id: Some(order_id.into()),
            status,
            message: message.into(),
            error_code: None,
            timestamp: Utc::now(),
            filled_quantity: 0,
            pending_quantity: 0,
            average_price: None,
        }
    }

    /// Rejected response.
    pub fn rejected(message: impl Into<String>, error_code: Option<ErrorCode>) -> Self {
        Self {
            order_id: None,
            status: OrderStatus::Rejected,
            message: message.into(),
            error_code,
            timestamp: Utc::now(),
            filled_quantity: 0,
            pending_quantity: 0,
            average_price: None,
        }
    }

    /// Partially filled response.
    pub fn partial(
        order_id: impl Into<String>,
        filled_quantity: u32,
        pending_quantity: u32,
        average_price: Option<Decimal>,
    ) -> Self {
        Self {
            order_id: Some(order_id.into()),
            status: OrderStatus::Partial,
            message: format!("Partially filled {filled_quantity}, {pending_quantity} pending"),
            error_code: None,
            timestamp: Utc::now(),
            filled_quantity,
            pending_quantity,
            average_price,
        }
    }

    /// Set the fill details.
    #[must_use]
    pub const fn with_fill(mut self, filled_quantity: u32, average_price: Option<Decimal>) -> Self {
        self.filled_quantity = filled_quantity;
        self.average_price = average_price;
        self
    }

    /// Order id present and not rejected.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.order_id.is_some() && self.status != OrderStatus::Rejected
    }

    /// Rejected or carrying an error code.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.status, OrderStatus::Rejected) || self.error_code.is_some()
    }
}

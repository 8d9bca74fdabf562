//! Order book rows and execution records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderAction, OrderStatus};

/// A row of the broker's order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    /// Broker order id.
    pub order_id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Exchange segment.
    #[serde(default)]
    pub exchange: String,
    /// Current status.
    pub status: OrderStatus,
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

/// A completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeExecution {
    /// Broker order id.
    pub order_id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Exchange segment.
    pub exchange: String,
    /// Side.
    pub action: OrderAction,
    /// Filled quantity.
    pub quantity: u32,
    /// Fill price.
    pub price: Decimal,
    /// Owning trade.
    pub trade_id: Option<String>,
    /// Fill time.
    pub executed_at: DateTime<Utc>,
}

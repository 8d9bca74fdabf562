//! One-cancels-other exit pairs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderAction;

/// A target/stop pair protecting one position.
///
/// Only the order manager's monitor cycle flips `active` to false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoOrder {
    /// Trading symbol of the protected position.
    pub symbol: String,
    /// Exchange segment.
    pub exchange: String,
    /// Target (limit) order id.
    pub target_order_id: String,
    /// Stop order id.
    pub stop_order_id: String,
    /// Size of both legs.
    pub quantity: u32,
    /// Side of both legs.
    pub exit_action: OrderAction,
    /// Target limit price.
    pub target_price: Decimal,
    /// Stop trigger price.
    pub stop_price: Decimal,
    /// Owning trade.
    pub trade_id: Option<String>,
    /// Both legs working.
    pub active: bool,
    /// When the pair was placed.
    pub created_at: DateTime<Utc>,
}

impl OcoOrder {
    /// Book key, `symbol:exchange`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.symbol, self.exchange)
    }

    /// The other leg's id, if `order_id` belongs to this pair.
    #[must_use]
    pub fn sibling_of(&self, order_id: &str) -> Option<&str> {
        if order_id == self.target_order_id {
            Some(&self.stop_order_id)
        } else if order_id == self.stop_order_id {
            Some(&self.target_order_id)
        } else {
            None
        }
    }
}

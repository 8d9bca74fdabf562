//! Paper trading: simulated fills and an in-memory position book.
//!
//! MARKET and LIMIT orders fill at once. Stop orders rest until the monitor
//! cycle sees the LTP cross the trigger.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::{OrderAction, OrderKind, OrderRequest, OrderStatus, Position};
use crate::retry::fallback::round_price;

/// Paper simulation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// MARKET slippage as a fraction of the base price.
    pub slippage: Decimal,
    /// Base price when neither LTP nor a limit price is known.
    pub fallback_price: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            slippage: dec!(0.002),
            fallback_price: dec!(100),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PaperOrder {
    pub request: OrderRequest,
    pub status: OrderStatus,
}

#[derive(Debug, Default)]
pub(crate) struct PaperBook {
    next_id: u64,
    orders: HashMap<String, PaperOrder>,
    positions: HashMap<String, Position>,
    realized_pnl: Decimal,
}

impl PaperBook {
    pub fn next_order_id(&mut self) -> String {
        self.next_id += 1;
        format!("PAPER_{:06}", self.next_id)
    }

    pub fn rest(&mut self, order_id: String, request: OrderRequest) {
        self.orders.insert(
            order_id,
            PaperOrder {
                request,
                status: OrderStatus::Pending,
            },
        );
    }

    /// Fill an order and book it. Resting orders are completed in place.
    pub fn fill(&mut self, order_id: &str, request: &OrderRequest, price: Decimal) {
        let order = self
            .orders
            .entry(order_id.to_string())
            .or_insert_with(|| PaperOrder {
                request: request.clone(),
                status: OrderStatus::Pending,
            });
        order.status = OrderStatus::Complete;
        self.realized_pnl += apply_fill(&mut self.positions, request, price);
    }

    /// Cancel a resting order.
    pub fn cancel(&mut self, order_id: &str) -> bool {
        match self.orders.get_mut(order_id) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = OrderStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    pub fn resting_stops(&self) -> Vec<(String, OrderRequest)> {
        let mut stops: Vec<_> = self
            .orders
            .iter()
            .filter(|(_, o)| o.status == OrderStatus::Pending && o.request.kind.requires_trigger())
            .map(|(id, o)| (id.clone(), o.request.clone()))
            .collect();
        stops.sort_by(|a, b| a.0.cmp(&b.0));
        stops
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Realized P&L of every reducing fill, including positions since flattened.
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn position_mut(&mut self, key: &str) -> Option<&mut Position> {
        self.positions.get_mut(key)
    }

    pub fn is_resting(&self, order_id: &str) -> bool {
        self.orders
            .get(order_id)
            .is_some_and(|o| o.status == OrderStatus::Pending)
    }
}

/// Simulated execution price.
///
/// `None` for stop kinds, which rest until triggered, and when no positive
/// price can be derived.
pub(crate) fn simulated_fill_price(
    order: &OrderRequest,
    ltp: Option<Decimal>,
    config: &PaperConfig,
) -> Option<Decimal> {
    let price = match order.kind {
        OrderKind::Market => {
            let base = ltp
                .or(order.price)
                .filter(|p| *p > Decimal::ZERO)
                .unwrap_or(config.fallback_price);
            let slippage = match order.action {
                OrderAction::Buy => config.slippage,
                OrderAction::Sell => -config.slippage,
            };
            round_price(base * (Decimal::ONE + slippage))
        }
        OrderKind::Limit => order.price?,
        OrderKind::StopLoss | OrderKind::StopLossMarket => return None,
    };
    (price > Decimal::ZERO).then_some(price)
}

/// Whether `ltp` has crossed a stop order's trigger.
pub(crate) fn stop_triggered(order: &OrderRequest, ltp: Decimal) -> bool {
    let Some(trigger) = order.trigger_price else {
        return false;
    };
    match order.action {
        OrderAction::Sell => ltp <= trigger,
        OrderAction::Buy => ltp >= trigger,
    }
}

/// Book a fill, returning the P&L it realized.
fn apply_fill(
    positions: &mut HashMap<String, Position>,
    order: &OrderRequest,
    price: Decimal,
) -> Decimal {
    let key = order.position_key();
    let delta = order.action.sign() * i64::from(order.quantity);

    let Some(position) = positions.get_mut(&key) else {
        let mut position = Position::new(
            order.symbol.clone(),
            order.token.clone(),
            order.exchange.clone(),
            delta,
            price,
        );
        position.product.clone_from(&order.product);
        position.trade_id.clone_from(&order.trade_id);
        position.strategy_name.clone_from(&order.strategy_name);
        positions.insert(key, position);
        return Decimal::ZERO;
    };

    let old = position.quantity;
    let new = old + delta;
    let mut realized = Decimal::ZERO;

    if old.signum() == delta.signum() {
        let old_cost = Decimal::from(old.abs()) * position.average_price;
        let add_cost = Decimal::from(delta.abs()) * price;
        position.average_price = (old_cost + add_cost) / Decimal::from(new.abs());
    } else {
        let closed = old.abs().min(delta.abs());
        let per_unit = (price - position.average_price) * Decimal::from(old.signum());
        realized = per_unit * Decimal::from(closed);
        position.realized_pnl += realized;
        if new.signum() == -old.signum() {
            position.average_price = price;
        }
    }

    if new == 0 {
        positions.remove(&key);
        return realized;
    }
    position.quantity = new;
    position.update_ltp(price);
    realized
}

//! Partial fill resolution.
//!
//! Decides what happens to the unfilled remainder of an order:
//!
//! - `immediate`: re-place the remainder as MARKET
//! - `time_based`: wait, re-checking every `check_interval_secs`, and cancel
//!   once `timeout_secs` has passed since the fill
//! - `price_based`: re-place the remainder as LIMIT with a small concession
//! - `cancel_remaining`: abandon the remainder

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::{OrderAction, OrderKind, OrderRequest};
use crate::retry::fallback::round_price;

/// Remainder disposition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFillStrategy {
    /// Re-place as MARKET.
    #[default]
    Immediate,
    /// Wait, then cancel.
    TimeBased,
    /// Re-place as LIMIT with a concession.
    PriceBased,
    /// Abandon.
    CancelRemaining,
}

/// Partial fill settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialFillConfig {
    /// Disposition strategy.
    pub strategy: PartialFillStrategy,
    /// `time_based`: give up this long after the fill.
    pub timeout_secs: u64,
    /// `time_based`: re-check interval.
    pub check_interval_secs: u64,
    /// `price_based`: fractional price concession.
    pub price_concession: Decimal,
}

impl Default for PartialFillConfig {
    fn default() -> Self {
        Self {
            strategy: PartialFillStrategy::Immediate,
            timeout_secs: 300,
            check_interval_secs: 60,
            price_concession: dec!(0.01),
        }
    }
}

/// A partial fill event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFill {
    /// Order that was partially filled.
    pub order_id: String,
    /// Quantity filled.
    pub filled_quantity: u32,
    /// Quantity still open.
    pub remaining_quantity: u32,
    /// Fill price, when reported.
    pub fill_price: Option<Decimal>,
}

/// What to do with the remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialFillDisposition {
    /// Submit a new order for the remainder.
    PlaceRemainder {
        /// Kind of the remainder order.
        kind: OrderKind,
        /// Limit price, for LIMIT remainders.
        price: Option<Decimal>,
        /// Urgent completion.
        urgent: bool,
    },
    /// Check again later.
    Wait {
        /// Delay before the next check.
        check_after: Duration,
    },
    /// Give up on the remainder.
    CancelRemaining {
        /// Why.
        reason: String,
    },
}

/// Stateless resolver over a [`PartialFillConfig`].
#[derive(Debug, Clone, Default)]
pub struct PartialFillResolver {
    config: PartialFillConfig,
}

impl PartialFillResolver {
    /// Create a resolver.
    #[must_use]
    pub const fn new(config: PartialFillConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &PartialFillConfig {
        &self.config
    }

    /// Decide the disposition of `fill` for an order on `action`, `elapsed`
    /// after the fill was observed.
    #[must_use]
    pub fn resolve(
        &self,
        fill: &PartialFill,
        action: OrderAction,
        elapsed: Duration,
    ) -> PartialFillDisposition {
        if fill.remaining_quantity == 0 {
            return PartialFillDisposition::CancelRemaining {
                reason: "nothing remaining".to_string(),
            };
        }
        match self.config.strategy {
            PartialFillStrategy::Immediate => PartialFillDisposition::PlaceRemainder {
                kind: OrderKind::Market,
                price: None,
                urgent: true,
            },
            PartialFillStrategy::TimeBased => {
                let timeout = Duration::from_secs(self.config.timeout_secs);
                if elapsed >= timeout {
                    PartialFillDisposition::CancelRemaining {
                        reason: "timeout".to_string(),
                    }
                } else {
                    let interval = Duration::from_secs(self.config.check_interval_secs);
                    PartialFillDisposition::Wait {
                        check_after: interval.min(timeout - elapsed),
                    }
                }
            }
            PartialFillStrategy::PriceBased => match fill.fill_price {
                Some(price) if price > Decimal::ZERO => {
                    let factor = match action {
                        OrderAction::Buy => Decimal::ONE + self.config.price_concession,
                        OrderAction::Sell => Decimal::ONE - self.config.price_concession,
                    };
                    PartialFillDisposition::PlaceRemainder {
                        kind: OrderKind::Limit,
                        price: Some(round_price(price * factor)),
                        urgent: false,
                    }
                }
                _ => PartialFillDisposition::PlaceRemainder {
                    kind: OrderKind::Market,
                    price: None,
                    urgent: false,
                },
            },
            PartialFillStrategy::CancelRemaining => PartialFillDisposition::CancelRemaining {
                reason: "strategy_decision".to_string(),
            },
        }
    }

    /// Build the remainder order from the working order.
    #[must_use]
    pub fn remainder_order(
        working: &OrderRequest,
        fill: &PartialFill,
        kind: OrderKind,
        price: Option<Decimal>,
    ) -> OrderRequest {
        let mut remainder = working.clone();
        remainder.quantity = fill.remaining_quantity;
        remainder.kind = kind;
        remainder.price = price;
        remainder.parent_order_id = Some(fill.order_id.clone());
        remainder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(price: Option<Decimal>) -> PartialFill {
        PartialFill {
            order_id: "ORD-1".to_string(),
            filled_quantity: 35,
            remaining_quantity: 35,
            fill_price: price,
        }
    }

    fn resolver(strategy: PartialFillStrategy) -> PartialFillResolver {
        PartialFillResolver::new(PartialFillConfig {
            strategy,
            ..PartialFillConfig::default()
        })
    }

    #[test]
    fn immediate_places_urgent_market() {
        let disposition = resolver(PartialFillStrategy::Immediate).resolve(
            &fill(Some(dec!(100))),
            OrderAction::Buy,
            Duration::ZERO,
        );
        assert_eq!(
            disposition,
            PartialFillDisposition::PlaceRemainder {
                kind: OrderKind::Market,
                price: None,
                urgent: true
            }
        );
    }

    #[test]
    fn time_based_waits_then_cancels() {
        let resolver = resolver(PartialFillStrategy::TimeBased);
        let f = fill(None);
        assert_eq!(
            resolver.resolve(&f, OrderAction::Buy, Duration::from_secs(10)),
            PartialFillDisposition::Wait {
                check_after: Duration::from_secs(60)
            }
        );
        assert_eq!(
            resolver.resolve(&f, OrderAction::Buy, Duration::from_secs(270)),
            PartialFillDisposition::Wait {
                check_after: Duration::from_secs(30)
            }
        );
        assert!(matches!(
            resolver.resolve(&f, OrderAction::Buy, Duration::from_secs(300)),
            PartialFillDisposition::CancelRemaining { .. }
        ));
    }

    #[test]
    fn price_based_concedes_towards_fill() {
        let resolver = resolver(PartialFillStrategy::PriceBased);
        assert_eq!(
            resolver.resolve(&fill(Some(dec!(100))), OrderAction::Buy, Duration::ZERO),
            PartialFillDisposition::PlaceRemainder {
                kind: OrderKind::Limit,
                price: Some(dec!(101.00)),
                urgent: false
            }
        );
        assert_eq!(
            resolver.resolve(&fill(Some(dec!(100))), OrderAction::Sell, Duration::ZERO),
            PartialFillDisposition::PlaceRemainder {
                kind: OrderKind::Limit,
                price: Some(dec!(99.00)),
                urgent: false
            }
        );
    }

    #[test]
    fn price_based_without_fill_price_goes_to_market() {
        let disposition = resolver(PartialFillStrategy::PriceBased).resolve(
            &fill(None),
            OrderAction::Buy,
            Duration::ZERO,
        );
        assert!(matches!(
            disposition,
            PartialFillDisposition::PlaceRemainder {
                kind: OrderKind::Market,
                ..
            }
        ));
    }

    #[test]
    fn remainder_links_parent() {
        let working = OrderRequest::limit(
            "BANKNIFTY24DEC50000CE",
            "12345",
            "NFO",
            OrderAction::Buy,
            70,
            dec!(100),
        );
        let remainder = PartialFillResolver::remainder_order(
            &working,
            &fill(None),
            OrderKind::Market,
            None,
        );
        assert_eq!(remainder.quantity, 35);
        assert_eq!(remainder.kind, OrderKind::Market);
        assert_eq!(remainder.price, None);
        assert_eq!(remainder.parent_order_id.as_deref(), Some("ORD-1"));
    }
}

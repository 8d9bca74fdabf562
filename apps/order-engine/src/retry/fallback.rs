//! Fallback mutations applied to a failed order before the next attempt.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gateway::FailureCategory;
use crate::models::{OrderAction, OrderKind, OrderRequest};

/// Mutation applied to the working copy of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    /// Move the limit price towards the market.
    AdjustPrice,
    /// Shrink the quantity.
    ReduceQuantity,
    /// Drop the limit price and go to market.
    ConvertToMarket,
    /// Stop retrying and escalate.
    ManualIntervention,
}

impl FallbackAction {
    /// Metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AdjustPrice => "adjust_price",
            Self::ReduceQuantity => "reduce_quantity",
            Self::ConvertToMarket => "convert_to_market",
            Self::ManualIntervention => "manual_intervention",
        }
    }
}

impl fmt::Display for FallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fallback settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Apply fallbacks at all.
    pub enabled: bool,
    /// Fractional price shift per adjustment.
    pub max_price_adjustment: Decimal,
    /// Smallest quantity reduction, in units.
    pub min_quantity_reduction: u32,
    /// Recorded failures before escalating unclassified errors.
    pub manual_intervention_threshold: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_price_adjustment: dec!(0.05),
            min_quantity_reduction: 1,
            manual_intervention_threshold: 5,
        }
    }
}

/// Fallback for a failure category.
#[must_use]
pub const fn fallback_for(category: FailureCategory) -> Option<FallbackAction> {
    match category {
        FailureCategory::Price => Some(FallbackAction::AdjustPrice),
        FailureCategory::Quantity => Some(FallbackAction::ReduceQuantity),
        FailureCategory::Liquidity => Some(FallbackAction::ConvertToMarket),
        FailureCategory::Transient | FailureCategory::Unknown => None,
    }
}

/// Pick the fallback for a failure.
///
/// `failures` counts recorded failures including this one. Escalation is
/// only considered when the category has no keyword match.
#[must_use]
pub const fn select_fallback(
    config: &FallbackConfig,
    category: FailureCategory,
    failures: usize,
) -> Option<FallbackAction> {
    if !config.enabled {
        return None;
    }
    match category {
        FailureCategory::Unknown if failures >= config.manual_intervention_threshold as usize => {
            Some(FallbackAction::ManualIntervention)
        }
        _ => fallback_for(category),
    }
}

/// Apply `action` to `order`, returning the mutation that actually happened.
///
/// A price adjustment that cannot move the price converts to market instead.
/// `None` means the order was left unchanged.
pub fn apply_fallback(
    config: &FallbackConfig,
    action: FallbackAction,
    order: &mut OrderRequest,
) -> Option<FallbackAction> {
    match action {
        FallbackAction::AdjustPrice => {
            if adjust_price(order, config.max_price_adjustment) {
                Some(FallbackAction::AdjustPrice)
            } else {
                convert_to_market(order).then_some(FallbackAction::ConvertToMarket)
            }
        }
        FallbackAction::ReduceQuantity => {
            reduce_quantity(order, config.min_quantity_reduction)
                .then_some(FallbackAction::ReduceQuantity)
        }
        FallbackAction::ConvertToMarket => {
            convert_to_market(order).then_some(FallbackAction::ConvertToMarket)
        }
        FallbackAction::ManualIntervention => Some(FallbackAction::ManualIntervention),
    }
}

/// Shift a LIMIT price by `fraction` towards a fill: up for BUY, down for SELL.
///
/// Returns false when the order is not a priced LIMIT or the rounded price
/// would not move.
pub fn adjust_price(order: &mut OrderRequest, fraction: Decimal) -> bool {
    if order.kind != OrderKind::Limit {
        return false;
    }
    let Some(price) = order.price else {
        return false;
    };
    let factor = match order.action {
        OrderAction::Buy => Decimal::ONE + fraction,
        OrderAction::Sell => Decimal::ONE - fraction,
    };
    let adjusted = round_price(price * factor);
    if adjusted == price || adjusted <= Decimal::ZERO {
        return false;
    }
    order.price = Some(adjusted);
    true
}

/// Reduce quantity by `max(min_reduction, quantity / 4)`, keeping at least 1.
///
/// Returns true when the quantity changed.
pub fn reduce_quantity(order: &mut OrderRequest, min_reduction: u32) -> bool {
    let reduction = min_reduction.max(order.quantity / 4);
    let reduced = order.quantity.saturating_sub(reduction).max(1);
    let changed = reduced != order.quantity;
    order.quantity = reduced;
    changed
}

/// Convert a LIMIT order to MARKET. No-op for any other kind.
///
/// Returns true when the order changed.
pub fn convert_to_market(order: &mut OrderRequest) -> bool {
    if order.kind != OrderKind::Limit {
        return false;
    }
    order.kind = OrderKind::Market;
    order.price = None;
    true
}

/// Round to two decimal places, midpoint away from zero.
#[must_use]
pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

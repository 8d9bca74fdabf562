//! Pre-trade order validation.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. Order parameters
//! 2. Market hours (exchange local time)
//! 3. Symbol, token and exchange allow-lists
//! 4. Price and trigger bounds, then the band around LTP when LTP is known
//! 5. Lot size and per-order lot cap
//! 6. Order value bounds
//! 7. Liquidity (only for fields present in the snapshot)

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::{OrderAction, OrderKind, OrderRequest};

/// Market data used by validation. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Last traded price.
    pub ltp: Option<Decimal>,
    /// Best bid.
    pub bid: Option<Decimal>,
    /// Best ask.
    pub ask: Option<Decimal>,
    /// Traded volume.
    pub volume: Option<u64>,
    /// Open interest.
    pub open_interest: Option<u64>,
}

impl MarketSnapshot {
    /// Snapshot holding only an LTP.
    #[must_use]
    pub fn from_ltp(ltp: Decimal) -> Self {
        Self {
            ltp: Some(ltp),
            ..Self::default()
        }
    }
}

/// Outcome of a validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Passed.
    pub is_valid: bool,
    /// What passed or which rule failed.
    pub message: String,
    /// Non-fatal note (e.g. extended hours).
    pub warning: Option<String>,
}

impl ValidationResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            message: message.into(),
            warning: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            warning: None,
        }
    }
}

/// Validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reject orders outside trading hours.
    pub enforce_market_hours: bool,
    /// Exchange UTC offset, minutes.
    pub utc_offset_minutes: i32,
    /// Regular session open.
    pub market_open: NaiveTime,
    /// Regular session close.
    pub market_close: NaiveTime,
    /// Extended session open.
    pub pre_market_open: NaiveTime,
    /// Extended session close.
    pub post_market_close: NaiveTime,
    /// Accepted symbol prefixes.
    pub allowed_symbol_prefixes: Vec<String>,
    /// Accepted exchanges.
    pub allowed_exchanges: Vec<String>,
    /// Shortest valid token.
    pub min_token_length: usize,
    /// Units per lot.
    pub lot_size: u32,
    /// Lots per order cap.
    pub max_lots_per_order: u32,
    /// Lowest valid price.
    pub min_price: Decimal,
    /// Highest valid price.
    pub max_price: Decimal,
    /// Max fractional deviation of price from LTP.
    pub price_tolerance: Decimal,
    /// Lowest order value.
    pub min_order_value: Decimal,
    /// Highest order value.
    pub max_order_value: Decimal,
    /// Max fractional bid/ask spread.
    pub max_bid_ask_spread: Decimal,
    /// Lowest traded volume.
    pub min_volume: u64,
    /// Lowest open interest.
    pub min_open_interest: u64,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enforce_market_hours: true,
            utc_offset_minutes: 330,
            market_open: hm(9, 15),
            market_close: hm(15, 30),
            pre_market_open: hm(9, 0),
            post_market_close: hm(16, 0),
            allowed_symbol_prefixes: vec!["BANKNIFTY".to_string()],
            allowed_exchanges: vec!["NFO".to_string(), "NSE".to_string()],
            min_token_length: 3,
            lot_size: 35,
            max_lots_per_order: 100,
            min_price: dec!(0.05),
            max_price: dec!(10000),
            price_tolerance: dec!(0.20),
            min_order_value: dec!(100),
            max_order_value: dec!(1000000),
            max_bid_ask_spread: dec!(0.10),
            min_volume: 100,
            min_open_interest: 50,
        }
    }
}

fn percent(fraction: Decimal) -> Decimal {
    fraction
        .checked_mul(dec!(100))
        .map_or(Decimal::MAX, |p| p.round_dp(2))
}

/// Pre-trade validator.
#[derive(Debug, Clone, Default)]
pub struct OrderValidator {
    config: ValidationConfig,
}

impl OrderValidator {
    /// Create a validator.
    #[must_use]
    pub const fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Run every check against the current time.
    #[must_use]
    pub fn validate_order(
        &self,
        order: &OrderRequest,
        market: Option<&MarketSnapshot>,
    ) -> ValidationResult {
        self.validate_order_at(order, market, Utc::now())
    }

    /// Run every check as of `now`.
    #[must_use]
    pub fn validate_order_at(
        &self,
        order: &OrderRequest,
        market: Option<&MarketSnapshot>,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let ltp = market.and_then(|m| m.ltp).filter(|p| *p > Decimal::ZERO);
        let mut warning = None;

        let result = Self::check_parameters(order);
        if !result.is_valid {
            return result;
        }
        if self.config.enforce_market_hours {
            let result = self.check_market_hours(now);
            if !result.is_valid {
                return result;
            }
            warning = result.warning;
        }
        for result in [
            self.check_symbol(order),
            self.check_price_bounds(order),
            ltp.map_or_else(
                || ValidationResult::ok("No LTP"),
                |ltp| self.check_price(order, ltp),
            ),
            self.check_quantity(order),
            self.check_order_value(order, ltp),
            market.map_or_else(
                || ValidationResult::ok("No market data"),
                |m| self.check_liquidity(m),
            ),
        ] {
            if !result.is_valid {
                return result;
            }
        }

        ValidationResult {
            is_valid: true,
            message: "Order validation successful".to_string(),
            warning,
        }
    }

    fn check_parameters(order: &OrderRequest) -> ValidationResult {
        match order.validate() {
            Ok(()) => ValidationResult::ok("Basic parameters valid"),
            Err(reason) => ValidationResult::fail(reason),
        }
    }

    fn check_market_hours(&self, now: DateTime<Utc>) -> ValidationResult {
        let Some(offset) = FixedOffset::east_opt(self.config.utc_offset_minutes * 60) else {
            return ValidationResult::fail(format!(
                "Invalid UTC offset {} minutes",
                self.config.utc_offset_minutes
            ));
        };
        let local = now.with_timezone(&offset).time();
        let c = &self.config;

        if c.market_open <= local && local <= c.market_close {
            return ValidationResult::ok("Market is open");
        }
        if (c.pre_market_open <= local && local < c.market_open)
            || (c.market_close < local && local <= c.post_market_close)
        {
            let mut result = ValidationResult::ok("Extended hours trading allowed");
            result.warning = Some("Trading in extended hours".to_string());
            return result;
        }
        ValidationResult::fail(format!(
            "Market is closed. Current time: {}",
            local.format("%H:%M:%S")
        ))
    }

    fn check_symbol(&self, order: &OrderRequest) -> ValidationResult {
        if !self
            .config
            .allowed_symbol_prefixes
            .iter()
            .any(|prefix| order.symbol.starts_with(prefix.as_str()))
        {
            return ValidationResult::fail(format!(
                "Unsupported symbol {}; allowed prefixes: {}",
                order.symbol,
                self.config.allowed_symbol_prefixes.join(", ")
            ));
        }
        if order.token.len() < self.config.min_token_length {
            return ValidationResult::fail("Invalid token format");
        }
        if !self.config.allowed_exchanges.iter().any(|e| *e == order.exchange) {
            return ValidationResult::fail(format!("Unsupported exchange: {}", order.exchange));
        }
        ValidationResult::ok("Symbol validation passed")
    }

    fn check_price_bounds(&self, order: &OrderRequest) -> ValidationResult {
        let c = &self.config;
        if let Some(price) = order.price {
            if price < c.min_price {
                return ValidationResult::fail(format!(
                    "Price {price} below minimum {}",
                    c.min_price
                ));
            }
            if price > c.max_price {
                return ValidationResult::fail(format!(
                    "Price {price} above maximum {}",
                    c.max_price
                ));
            }
        }
        if let Some(trigger) = order.trigger_price {
            if trigger < c.min_price || trigger > c.max_price {
                return ValidationResult::fail("Trigger price outside valid range");
            }
        }
        ValidationResult::ok("Price bounds passed")
    }

    fn check_price(&self, order: &OrderRequest, ltp: Decimal) -> ValidationResult {
        let c = &self.config;
        if let Some(price) = order.price {
            let Some(deviation) = (price - ltp).abs().checked_div(ltp) else {
                return ValidationResult::fail(format!("Price {price} too far from LTP {ltp}"));
            };
            if deviation > c.price_tolerance {
                return ValidationResult::fail(format!(
                    "Price deviation {}% exceeds tolerance {}%",
                    percent(deviation),
                    percent(c.price_tolerance)
                ));
            }
        }
        if let Some(trigger) = order.trigger_price {
            if order.kind.requires_trigger() {
                match order.action {
                    OrderAction::Sell if trigger >= ltp => {
                        return ValidationResult::fail(
                            "Stop loss trigger should be below current price for sell orders",
                        );
                    }
                    OrderAction::Buy if trigger <= ltp => {
                        return ValidationResult::fail(
                            "Stop loss trigger should be above current price for buy orders",
                        );
                    }
                    _ => {}
                }
            }
        }
        ValidationResult::ok("Price validation passed")
    }

    fn check_quantity(&self, order: &OrderRequest) -> ValidationResult {
        let lot = self.config.lot_size.max(1);
        if order.quantity % lot != 0 {
            return ValidationResult::fail(format!(
                "Quantity {} must be multiple of lot size {lot}",
                order.quantity
            ));
        }
        let max_quantity = self.config.max_lots_per_order.saturating_mul(lot);
        if order.quantity > max_quantity {
            return ValidationResult::fail(format!(
                "Quantity {} exceeds maximum {max_quantity}",
                order.quantity
            ));
        }
        ValidationResult::ok("Quantity validation passed")
    }

    fn check_order_value(&self, order: &OrderRequest, ltp: Option<Decimal>) -> ValidationResult {
        let price = order
            .price
            .filter(|p| *p > Decimal::ZERO)
            .or(ltp)
            .or_else(|| order.trigger_price.filter(|p| *p > Decimal::ZERO));
        let Some(price) = price else {
            return ValidationResult::fail("Cannot calculate order value without valid price");
        };
        let Some(value) = Decimal::from(order.quantity).checked_mul(price) else {
            return ValidationResult::fail(format!(
                "Order value exceeds maximum {}",
                self.config.max_order_value
            ));
        };
        if value > self.config.max_order_value {
            return ValidationResult::fail(format!(
                "Order value {} exceeds maximum {}",
                value.round_dp(2),
                self.config.max_order_value
            ));
        }
        if value < self.config.min_order_value {
            return ValidationResult::fail(format!(
                "Order value {} below minimum {}",
                value.round_dp(2),
                self.config.min_order_value
            ));
        }
        ValidationResult::ok("Order value validation passed")
    }

    fn check_liquidity(&self, market: &MarketSnapshot) -> ValidationResult {
        if let (Some(bid), Some(ask)) = (market.bid, market.ask) {
            if bid > Decimal::ZERO && ask > Decimal::ZERO {
                let mid = bid / dec!(2) + ask / dec!(2);
                let spread = (ask - bid) / mid;
                if spread > self.config.max_bid_ask_spread {
                    return ValidationResult::fail(format!(
                        "Bid-ask spread {}% exceeds maximum {}%",
                        percent(spread),
                        percent(self.config.max_bid_ask_spread)
                    ));
                }
            }
        }
        if let Some(volume) = market.volume {
            if volume < self.config.min_volume {
                return ValidationResult::fail(format!(
                    "Volume {volume} below minimum {}",
                    self.config.min_volume
                ));
            }
        }
        if let Some(oi) = market.open_interest {
            if oi < self.config.min_open_interest {
                return ValidationResult::fail(format!(
                    "Open interest {oi} below minimum {}",
                    self.config.min_open_interest
                ));
            }
        }
        ValidationResult::ok("Market conditions validation passed")
    }

    /// Check a target/stop pair against the position it protects.
    #[must_use]
    pub fn validate_oco_orders(
        &self,
        target: &OrderRequest,
        stop: &OrderRequest,
        position_quantity: i64,
    ) -> ValidationResult {
        if let Err(reason) = target.validate() {
            return ValidationResult::fail(format!("Target order validation failed: {reason}"));
        }
        if let Err(reason) = stop.validate() {
            return ValidationResult::fail(format!("Stop order validation failed: {reason}"));
        }
        if position_quantity == 0 {
            return ValidationResult::fail("No position to protect");
        }
        if target.symbol != stop.symbol || target.exchange != stop.exchange {
            return ValidationResult::fail("OCO orders must be for the same symbol");
        }
        let size = position_quantity.unsigned_abs();
        if u64::from(target.quantity) != size {
            return ValidationResult::fail("Target order quantity must match position quantity");
        }
        if u64::from(stop.quantity) != size {
            return ValidationResult::fail("Stop order quantity must match position quantity");
        }
        let expected = if position_quantity > 0 {
            OrderAction::Sell
        } else {
            OrderAction::Buy
        };
        if target.action != expected {
            return ValidationResult::fail(format!("Target order action should be {expected}"));
        }
        if stop.action != expected {
            return ValidationResult::fail(format!("Stop order action should be {expected}"));
        }
        if let (Some(target_price), Some(stop_trigger)) = (target.price, stop.trigger_price) {
            if position_quantity > 0 && target_price <= stop_trigger {
                return ValidationResult::fail(
                    "Target price should be higher than stop loss trigger for long positions",
                );
            }
            if position_quantity < 0 && target_price >= stop_trigger {
                return ValidationResult::fail(
                    "Target price should be lower than stop loss trigger for short positions",
                );
            }
        }
        if target.kind != OrderKind::Limit {
            return ValidationResult::fail("Target order must be a LIMIT order");
        }
        if !stop.kind.requires_trigger() {
            return ValidationResult::fail("Stop order must be a stop-loss order");
        }
        ValidationResult::ok("OCO orders validation passed")
    }
}

//! Brokerage gateway contract.
//!
//! The engine never talks HTTP itself. Everything it needs from the broker
//! goes through [`BrokerGateway`]; failures come back as [`GatewayError`] and
//! are classified once, here, into a [`FailureCategory`] that the retry
//! policy consumes.

mod classify;
pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{OrderBookEntry, OrderRequest, PositionBookEntry};

pub use classify::{FailureCategory, classify_failure};

/// Abstract brokerage API.
///
/// Implementations bound their own network timeouts. `None` or empty results
/// mean "no data yet", not failure.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Submit an order, returning the broker-assigned order id.
    async fn place_order(&self, order: &OrderRequest) -> Result<String, GatewayError>;

    /// Cancel an order placed with `variety`.
    async fn cancel_order(&self, order_id: &str, variety: &str) -> Result<bool, GatewayError>;

    /// Current order book.
    async fn get_order_book(&self) -> Result<Vec<OrderBookEntry>, GatewayError>;

    /// Current position book.
    async fn get_positions(&self) -> Result<Vec<PositionBookEntry>, GatewayError>;

    /// Last traded price.
    async fn get_ltp(
        &self,
        exchange: &str,
        symbol: &str,
        token: &str,
    ) -> Result<Option<Decimal>, GatewayError>;
}

/// Errors from gateway operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Call did not complete in time.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Throttled by the broker.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Broker rejected the order.
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// API returned an error.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from broker.
        code: String,
        /// Error message from broker.
        message: String,
    },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),
}

impl GatewayError {
    /// Failure category for fallback selection.
    ///
    /// Transport-shaped variants are always transient; broker messages are
    /// classified by their text.
    #[must_use]
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => {
                FailureCategory::Transient
            }
            Self::Rejected(message) | Self::Api { message, .. } => classify_failure(message),
            Self::OrderNotFound(_) => FailureCategory::Unknown,
        }
    }
}

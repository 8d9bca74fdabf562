//! Error codes and error types for the order engine.
//!
//! # Error Codes
//!
//! | Code | Usage |
//! |------|-------|
//! | `VALIDATION_ERROR` | Order failed pre-trade validation, never sent |
//! | `MAX_RETRIES_EXCEEDED` | Retry attempts exhausted |
//! | `RETRY_TIMEOUT` | Wall-clock retry budget exhausted |
//! | `MANUAL_INTERVENTION` | Failure threshold reached, escalated to operator |
//! | `PLACEMENT_ERROR` | Broker accepted the call but returned no order id |
//! | `GATEWAY_ERROR` | Broker call raised |
//! | `PAPER_SIMULATION_ERROR` | Paper fill could not be priced |
//! | `PARTIAL_FILL_CANCELLED` | Remainder of a partial fill abandoned |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::OrderStatus;

/// Error codes carried by rejected order responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Local validation failed.
    ValidationError,
    /// Retry attempts exhausted.
    MaxRetriesExceeded,
    /// Retry timeout exhausted.
    RetryTimeout,
    /// Operator escalation required.
    ManualIntervention,
    /// Broker returned no order id.
    PlacementError,
    /// Broker call failed.
    GatewayError,
    /// Paper fill simulation failed.
    PaperSimulationError,
    /// Partial fill remainder was cancelled.
    PartialFillCancelled,
}

impl ErrorCode {
    /// Get the error reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::RetryTimeout => "RETRY_TIMEOUT",
            Self::ManualIntervention => "MANUAL_INTERVENTION",
            Self::PlacementError => "PLACEMENT_ERROR",
            Self::GatewayError => "GATEWAY_ERROR",
            Self::PaperSimulationError => "PAPER_SIMULATION_ERROR",
            Self::PartialFillCancelled => "PARTIAL_FILL_CANCELLED",
        }
    }

    /// Whether this code marks a terminal failure of the retry engine.
    #[must_use]
    pub const fn is_terminal_retry_failure(&self) -> bool {
        matches!(
            self,
            Self::MaxRetriesExceeded | Self::RetryTimeout | Self::ManualIntervention
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Order lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    /// Status transition not allowed by the order state machine.
    #[error("invalid status transition {from} -> {to}: {reason}")]
    InvalidStateTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
        /// Human-readable reason.
        reason: String,
    },

    /// Order not tracked by the manager.
    #[error("order not found: {0}")]
    OrderNotFound(String),
}

/// Errors opening a trade from a signal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TradeError {
    /// Signal carried no legs.
    #[error("signal from {0} has no legs")]
    EmptySignal(String),

    /// A leg could not be placed; earlier legs were unwound.
    #[error("leg {leg_index} ({symbol}) failed: {message}")]
    LegFailed {
        /// Zero-based leg position.
        leg_index: usize,
        /// Leg symbol.
        symbol: String,
        /// Placement failure message.
        message: String,
    },
}

//! Order status and its state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OrderError;

/// Broker-side order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted, not yet acknowledged.
    Pending,
    /// Acknowledged and working on the book.
    Open,
    /// Some quantity filled, remainder working.
    Partial,
    /// Fully filled.
    Complete,
    /// Rejected by the broker or locally.
    Rejected,
    /// Cancelled before completion.
    Cancelled,
}

impl OrderStatus {
    /// Returns true if no further transitions are allowed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Rejected | Self::Cancelled)
    }

    /// Returns true if the order can still be cancelled.
    #[must_use]
    pub const fn is_cancelable(&self) -> bool {
        matches!(self, Self::Pending | Self::Open | Self::Partial)
    }

    /// Parse a broker status string.
    ///
    /// Brokers report a handful of spellings for the same state; unknown
    /// strings map to `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "TRIGGER PENDING" | "VALIDATION PENDING" | "PUT ORDER REQ RECEIVED" => {
                Some(Self::Pending)
            }
            "OPEN" | "OPEN PENDING" => Some(Self::Open),
            "PARTIAL" | "PARTIALLY FILLED" => Some(Self::Partial),
            "COMPLETE" | "FILLED" => Some(Self::Complete),
            "REJECTED" => Some(Self::Rejected),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::Partial => "PARTIAL",
            Self::Complete => "COMPLETE",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates order status transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            (
                OrderStatus::Pending,
                OrderStatus::Open
                    | OrderStatus::Partial
                    | OrderStatus::Complete
                    | OrderStatus::Rejected
                    | OrderStatus::Cancelled
            ) | (
                OrderStatus::Open,
                OrderStatus::Partial
                    | OrderStatus::Complete
                    | OrderStatus::Rejected
                    | OrderStatus::Cancelled
            ) | (
                OrderStatus::Partial,
                OrderStatus::Partial | OrderStatus::Complete | OrderStatus::Cancelled
            )
        )
    }

    /// Validate a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidStateTransition`] when the move is not allowed.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                from,
                to,
                reason: Self::transition_error_reason(from, to),
            })
        }
    }

    fn transition_error_reason(from: OrderStatus, to: OrderStatus) -> String {
        match from {
            OrderStatus::Complete => format!("Order is already complete, cannot move to {to}"),
            OrderStatus::Cancelled => format!("Order is cancelled, cannot move to {to}"),
            OrderStatus::Rejected => format!("Order was rejected, cannot move to {to}"),
            _ => format!("Invalid transition from {from} to {to}"),
        }
    }

    /// All valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        match from {
            OrderStatus::Pending => vec![
                OrderStatus::Open,
                OrderStatus::Partial,
                OrderStatus::Complete,
                OrderStatus::Rejected,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Open => vec![
                OrderStatus::Partial,
                OrderStatus::Complete,
                OrderStatus::Rejected,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Partial => vec![
                OrderStatus::Partial,
                OrderStatus::Complete,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Complete | OrderStatus::Rejected | OrderStatus::Cancelled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_reaches_every_other_state() {
        for to in [
            OrderStatus::Open,
            OrderStatus::Partial,
            OrderStatus::Complete,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ] {
            assert!(OrderStateMachine::is_valid_transition(OrderStatus::Pending, to));
        }
    }

    #[test]
    fn partial_accepts_more_fills() {
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::Partial,
            OrderStatus::Partial
        ));
        assert!(!OrderStateMachine::is_valid_transition(
            OrderStatus::Partial,
            OrderStatus::Rejected
        ));
    }

    #[test]
    fn no_transitions_from_terminal_states() {
        for terminal in [
            OrderStatus::Complete,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            assert!(OrderStateMachine::valid_next_states(terminal).is_empty());
            assert!(
                OrderStateMachine::validate_transition(terminal, OrderStatus::Open).is_err()
            );
        }
    }

    #[test]
    fn next_states_agree_with_predicate() {
        let all = [
            OrderStatus::Pending,
            OrderStatus::Open,
            OrderStatus::Partial,
            OrderStatus::Complete,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ];
        for from in all {
            let next = OrderStateMachine::valid_next_states(from);
            for to in all {
                assert_eq!(
                    next.contains(&to),
                    OrderStateMachine::is_valid_transition(from, to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn parses_broker_spellings() {
        assert_eq!(OrderStatus::parse("complete"), Some(OrderStatus::Complete));
        assert_eq!(OrderStatus::parse("CANCELED"), Some(OrderStatus::Cancelled));
        assert_eq!(
            OrderStatus::parse("TRIGGER PENDING"),
            Some(OrderStatus::Pending)
        );
        assert_eq!(OrderStatus::parse("AMO REQ"), None);
    }
}

//! Failure classification.
//!
//! Broker rejection text is loose, so matching is by keyword in a fixed
//! priority order: the first group that matches wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a failed attempt was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Price rejected (band, tick, limit).
    Price,
    /// Quantity rejected (lot size, freeze).
    Quantity,
    /// Not enough liquidity for the order kind.
    Liquidity,
    /// Network, timeout or throttling.
    Transient,
    /// Nothing recognisable.
    Unknown,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Price => "price",
            Self::Quantity => "quantity",
            Self::Liquidity => "liquidity",
            Self::Transient => "transient",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FailureCategory {
    /// Network-shaped failure, retried without mutation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

const KEYWORDS: &[(FailureCategory, &[&str])] = &[
    (FailureCategory::Price, &["price", "limit"]),
    (FailureCategory::Quantity, &["quantity", "lot size"]),
    (FailureCategory::Liquidity, &["market order", "liquidity"]),
    (
        FailureCategory::Transient,
        &["timeout", "timed out", "network", "connection", "throttl"],
    ),
];

/// Classify a failure message.
#[must_use]
pub fn classify_failure(message: &str) -> FailureCategory {
    let message = message.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| message.contains(w)))
        .map_or(FailureCategory::Unknown, |(category, _)| *category)
}

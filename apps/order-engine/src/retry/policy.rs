//! Retry delay schedules.
//!
//! | Strategy | Delay for attempt `n` (0-based) |
//! |----------|-------------------------------|
//! | `exponential` | `base × multiplier^n` |
//! | `linear` | `base × (n + 1)` |
//! | `fixed` | `base` |
//! | `immediate` | `0` |
//!
//! Delays are capped at `max_delay_ms`, then optionally jittered by a
//! uniform 0.8–1.2 multiplier so concurrently failing orders spread out.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// `base × multiplier^attempt`.
    #[default]
    #[serde(alias = "exponential_backoff")]
    Exponential,
    /// `base × (attempt + 1)`.
    #[serde(alias = "linear_backoff")]
    Linear,
    /// `base`.
    #[serde(alias = "fixed_delay")]
    Fixed,
    /// No delay.
    Immediate,
}

/// Order placement retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay schedule.
    pub strategy: RetryStrategy,
    /// Attempts per order (and per partial-fill remainder).
    pub max_attempts: u32,
    /// Base delay.
    pub base_delay_ms: u64,
    /// Cap on any single delay, before jitter.
    pub max_delay_ms: u64,
    /// Growth factor for `exponential`.
    pub backoff_multiplier: f64,
    /// Apply a 0.8–1.2 random multiplier.
    pub jitter: bool,
    /// Wall-clock budget for one `execute_with_retry` call.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
            timeout_secs: 300,
        }
    }
}

impl RetryConfig {
    /// Overall timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const JITTER_MIN: f64 = 0.8;
const JITTER_MAX: f64 = 1.2;

/// Computes inter-attempt delays for a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    strategy: RetryStrategy,
    base_delay_ms: f64,
    max_delay_ms: f64,
    backoff_multiplier: f64,
    jitter: bool,
}

impl BackoffCalculator {
    /// Create a calculator from retry settings.
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            strategy: config.strategy,
            base_delay_ms: config.base_delay_ms as f64,
            max_delay_ms: config.max_delay_ms as f64,
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped_ms = self.base_delay_ms_for(attempt);
        let jittered_ms = if self.jitter && capped_ms > 0.0 {
            capped_ms * rand::rng().random_range(JITTER_MIN..=JITTER_MAX)
        } else {
            capped_ms
        };
        Duration::from_millis(jittered_ms.max(0.0).round() as u64)
    }

    /// Capped delay without jitter, in milliseconds.
    #[must_use]
    pub fn base_delay_ms_for(&self, attempt: u32) -> f64 {
        let raw = match self.strategy {
            RetryStrategy::Exponential => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                self.base_delay_ms * self.backoff_multiplier.powi(exponent)
            }
            RetryStrategy::Linear => self.base_delay_ms * f64::from(attempt.saturating_add(1)),
            RetryStrategy::Fixed => self.base_delay_ms,
            RetryStrategy::Immediate => 0.0,
        };
        raw.min(self.max_delay_ms)
    }
}

//! Engine configuration.
//!
//! Every section has defaults, so an empty document is a valid paper-mode
//! configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use order_engine::config::load_config;
//!
//! // Load from default path (order-engine.yaml)
//! let config = load_config(None)?;
//! let manager = OrderManager::new(gateway, config.order_manager_config());
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::LoggingConfig;
use crate::order_manager::{MonitoringConfig, OrderManagerConfig, PaperConfig, TradingMode};
use crate::partial_fill::PartialFillConfig;
use crate::position_monitor::PositionMonitorConfig;
use crate::retry::{FallbackConfig, OperationRetryConfig, RetryConfig};
use crate::validation::ValidationConfig;

const DEFAULT_CONFIG_PATH: &str = "order-engine.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `paper` or `live`.
    pub mode: TradingMode,
    /// Order placement retries.
    pub retry: RetryConfig,
    /// Fallback mutations between attempts.
    pub fallback: FallbackConfig,
    /// Partial fill handling.
    pub partial_fill: PartialFillConfig,
    /// Retries for cancels and book queries.
    pub operations: OperationRetryConfig,
    /// Pre-trade checks.
    pub validation: ValidationConfig,
    /// Paper simulation.
    pub paper: PaperConfig,
    /// Order manager refresh loop.
    pub monitoring: MonitoringConfig,
    /// Trade exit monitoring.
    pub position_monitor: PositionMonitorConfig,
    /// Tracing subscriber.
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Order manager settings drawn from this configuration.
    #[must_use]
    pub fn order_manager_config(&self) -> OrderManagerConfig {
        OrderManagerConfig {
            mode: self.mode,
            retry: self.retry.clone(),
            fallback: self.fallback.clone(),
            partial_fill: self.partial_fill.clone(),
            operations: self.operations.clone(),
            validation: self.validation.clone(),
            paper: self.paper.clone(),
            monitoring: self.monitoring.clone(),
        }
    }
}

/// Load configuration from a YAML file, `order-engine.yaml` by default.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<EngineConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: EngineConfig = if interpolated.trim().is_empty() {
        EngineConfig::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
///
/// Unset or empty variables take the default, or the empty string.
#[allow(clippy::expect_used)] // constant pattern
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts must be at least 1"));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(invalid("retry.base_delay_ms must not exceed retry.max_delay_ms"));
    }
    if retry.backoff_multiplier < 1.0 {
        return Err(invalid("retry.backoff_multiplier must be at least 1.0"));
    }

    let operations = &config.operations;
    if operations.max_attempts == 0 {
        return Err(invalid("operations.max_attempts must be at least 1"));
    }
    if operations.base_delay_ms > operations.max_delay_ms {
        return Err(invalid(
            "operations.base_delay_ms must not exceed operations.max_delay_ms",
        ));
    }

    let fallback = &config.fallback;
    if fallback.max_price_adjustment.is_sign_negative()
        || fallback.max_price_adjustment >= Decimal::ONE
    {
        return Err(invalid("fallback.max_price_adjustment must be in [0, 1)"));
    }

    let validation = &config.validation;
    if validation.lot_size == 0 {
        return Err(invalid("validation.lot_size must be positive"));
    }
    if validation.max_lots_per_order == 0 {
        return Err(invalid("validation.max_lots_per_order must be positive"));
    }
    if validation.min_price > validation.max_price {
        return Err(invalid("validation.min_price must not exceed validation.max_price"));
    }
    if validation.min_order_value > validation.max_order_value {
        return Err(invalid(
            "validation.min_order_value must not exceed validation.max_order_value",
        ));
    }
    if validation.market_open >= validation.market_close {
        return Err(invalid("validation.market_open must be before validation.market_close"));
    }

    if config.paper.slippage.is_sign_negative() {
        return Err(invalid("paper.slippage must not be negative"));
    }
    if config.monitoring.interval_ms == 0 {
        return Err(invalid("monitoring.interval_ms must be positive"));
    }

    let monitor = &config.position_monitor;
    if monitor.max_daily_loss > Decimal::ZERO {
        return Err(invalid("position_monitor.max_daily_loss must not be positive"));
    }
    if monitor.default_stop_loss >= monitor.default_target_pnl {
        return Err(invalid(
            "position_monitor.default_stop_loss must be below default_target_pnl",
        ));
    }
    if monitor.interval_ms == 0 {
        return Err(invalid("position_monitor.interval_ms must be positive"));
    }

    if !["json", "pretty"].contains(&config.logging.format.to_ascii_lowercase().as_str()) {
        return Err(invalid("logging.format must be 'json' or 'pretty'"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partial_fill::PartialFillStrategy;
    use crate::retry::RetryStrategy;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_document_is_paper_defaults() {
        let config = match load_config_from_string("") {
            Ok(c) => c,
            Err(e) => panic!("should load empty config: {e}"),
        };
        assert_eq!(config.mode, TradingMode::Paper);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.validation.lot_size, 35);
        assert_eq!(config.position_monitor.max_daily_loss, dec!(-5000));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn sections_override_defaults() {
        let yaml = r"
mode: live
retry:
  strategy: linear
  max_attempts: 5
  base_delay_ms: 200
partial_fill:
  strategy: price_based
validation:
  lot_size: 15
  allowed_symbol_prefixes: [NIFTY, BANKNIFTY]
position_monitor:
  max_daily_loss: -8000
  auto_place_oco_orders: true
";
        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load config: {e}"),
        };
        assert_eq!(config.mode, TradingMode::Live);
        assert_eq!(config.retry.strategy, RetryStrategy::Linear);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 200);
        // unset fields keep defaults
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.partial_fill.strategy, PartialFillStrategy::PriceBased);
        assert_eq!(config.validation.lot_size, 15);
        assert_eq!(config.validation.allowed_symbol_prefixes.len(), 2);
        assert_eq!(config.position_monitor.max_daily_loss, dec!(-8000));
        assert!(config.position_monitor.auto_place_oco_orders);

        let manager = config.order_manager_config();
        assert_eq!(manager.mode, TradingMode::Live);
        assert_eq!(manager.validation.lot_size, 15);
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = load_config_from_string("retry:\n  max_attempts: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("max_attempts")));
    }

    #[test]
    fn inverted_delays_rejected() {
        let yaml = "retry:\n  base_delay_ms: 5000\n  max_delay_ms: 1000\n";
        assert!(matches!(
            load_config_from_string(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn zero_lot_size_rejected() {
        let err = load_config_from_string("validation:\n  lot_size: 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Config validation failed: validation.lot_size must be positive"
        );
    }

    #[test]
    fn positive_daily_loss_rejected() {
        let yaml = "position_monitor:\n  max_daily_loss: 100\n";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn unknown_mode_is_parse_error() {
        assert!(matches!(
            load_config_from_string("mode: shadow\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Some("/nonexistent/order-engine.yaml")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ReadError { ref path, .. } if path == "/nonexistent/order-engine.yaml"
        ));
    }

    #[test]
    fn env_var_with_default_when_missing() {
        let input = "mode: ${ORDER_ENGINE_TEST_NONEXISTENT_VAR:-paper}";
        assert_eq!(interpolate_env_vars(input), "mode: paper");
    }

    #[test]
    fn env_var_without_default_becomes_empty() {
        let input = "level: \"${ORDER_ENGINE_TEST_NONEXISTENT_VAR}\"";
        assert_eq!(interpolate_env_vars(input), "level: \"\"");
    }

    #[test]
    #[allow(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax
    fn env_var_uses_existing_value() {
        let Ok(path) = std::env::var("PATH") else {
            return;
        };
        assert_eq!(interpolate_env_vars("p: ${PATH:-none}"), format!("p: {path}"));
    }

    #[test]
    fn interpolated_mode_loads() {
        let yaml = "mode: ${ORDER_ENGINE_TEST_NONEXISTENT_MODE:-live}\n";
        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load config: {e}"),
        };
        assert_eq!(config.mode, TradingMode::Live);
    }
}

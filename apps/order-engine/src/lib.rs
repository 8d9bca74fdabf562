// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Order Engine - Rust Core Library
//!
//! Order execution and retry engine for an automated options trading system.
//!
//! # Layout
//!
//! - `models`: order intents and responses, status lifecycle, positions,
//!   trades and OCO pairs
//! - `gateway`: the `BrokerGateway` port and failure classification
//! - `retry`: backoff schedules, fallback mutations and the retry executor
//! - `partial_fill`: what to do with the unfilled remainder of an order
//! - `validation`: pre-trade checks
//! - `order_manager`: live and paper placement, tracking, OCO pairs and the
//!   refresh loop
//! - `position_monitor`: trade-level exits and daily risk limits
//! - `config`: YAML configuration with environment interpolation
//! - `observability`: tracing setup and metrics
//!
//! # Flow
//!
//! A strategy hands an `OrderRequest` (or a `TradeSignal`) to the
//! `OrderManager`. The request is validated, then placed through the retry
//! executor (live) or filled by the paper simulator. The `PositionMonitor`
//! watches the resulting trades and closes them through the same manager.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod observability;
pub mod order_manager;
pub mod partial_fill;
pub mod position_monitor;
pub mod retry;
pub mod validation;

pub use config::{ConfigError, EngineConfig, load_config, load_config_from_string};
pub use error::{ErrorCode, OrderError, TradeError};
pub use gateway::{BrokerGateway, FailureCategory, GatewayError};
pub use models::{
    CloseReason, OcoOrder, OrderAction, OrderKind, OrderRequest, OrderResponse, OrderStatus,
    Position, Trade, TradeSignal,
};
pub use order_manager::{OrderManager, OrderManagerConfig, TradingMode};
pub use partial_fill::{PartialFillResolver, PartialFillStrategy};
pub use position_monitor::{MonitorEvent, PositionMonitor, PositionMonitorConfig, RiskAlert};
pub use retry::{OrderRetryExecutor, RetryConfig, RetryStrategy};
pub use validation::{OrderValidator, ValidationConfig, ValidationResult};

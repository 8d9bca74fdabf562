//! Value types shared by every component.

mod execution;
mod oco;
mod order;
mod position;
mod status;
mod trade;

pub use execution::{OrderBookEntry, TradeExecution};
pub use oco::OcoOrder;
pub use order::{OrderAction, OrderKind, OrderRequest, OrderResponse, Validity};
pub use position::{Position, PositionBookEntry};
pub use status::{OrderStateMachine, OrderStatus};
pub use trade::{CloseReason, OptionType, SignalLeg, Trade, TradeLeg, TradeSignal, TradeStatus};

//! Scriptable in-memory gateway for tests and dry runs.
//!
//! Placement and cancel outcomes are queued; once a queue is empty the mock
//! accepts with sequential ids (`MOCK-1`, `MOCK-2`, ...) and cancels
//! successfully. Every call is recorded.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::{BrokerGateway, GatewayError};
use crate::models::{OrderBookEntry, OrderRequest, OrderStatus, PositionBookEntry};

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    place_outcomes: VecDeque<Result<String, GatewayError>>,
    cancel_outcomes: VecDeque<Result<bool, GatewayError>>,
    order_book_failures: usize,
    ltps: HashMap<String, Decimal>,
    order_book: Vec<OrderBookEntry>,
    positions: Vec<PositionBookEntry>,
    placed: Vec<OrderRequest>,
    issued: HashMap<String, OrderRequest>,
    cancelled: Vec<(String, String)>,
}

/// Mock gateway.
#[derive(Debug, Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a placement outcome.
    pub fn push_place_result(&self, result: Result<String, GatewayError>) {
        self.state.lock().place_outcomes.push_back(result);
    }

    /// Queue a rejection with the given broker message.
    pub fn push_rejection(&self, message: impl Into<String>) {
        self.push_place_result(Err(GatewayError::Rejected(message.into())));
    }

    /// Queue a cancel outcome.
    pub fn push_cancel_result(&self, result: Result<bool, GatewayError>) {
        self.state.lock().cancel_outcomes.push_back(result);
    }

    /// Fail the next `count` order book queries with a network error.
    pub fn fail_order_book(&self, count: usize) {
        self.state.lock().order_book_failures = count;
    }

    /// Set the last traded price for a symbol.
    pub fn set_ltp(&self, symbol: impl Into<String>, ltp: Decimal) {
        self.state.lock().ltps.insert(symbol.into(), ltp);
    }

    /// Replace the position book.
    pub fn set_positions(&self, positions: Vec<PositionBookEntry>) {
        self.state.lock().positions = positions;
    }

    /// Upsert an order book row.
    pub fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        filled_quantity: u32,
        average_price: Option<Decimal>,
    ) {
        let mut state = self.state.lock();
        let (symbol, exchange) = state
            .issued
            .get(order_id)
            .map(|o| (o.symbol.clone(), o.exchange.clone()))
            .unwrap_or_default();
        if let Some(entry) = state.order_book.iter_mut().find(|e| e.order_id == order_id) {
            entry.status = status;
            entry.filled_quantity = filled_quantity;
            entry.average_price = average_price;
        } else {
            state.order_book.push(OrderBookEntry {
                order_id: order_id.to_string(),
                symbol,
                exchange,
                status,
                filled_quantity,
                pending_quantity: 0,
                average_price,
            });
        }
    }

    /// Orders submitted so far, including rejected attempts.
    #[must_use]
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().placed.clone()
    }

    /// `(order_id, variety)` of every cancel call.
    #[must_use]
    pub fn cancelled_orders(&self) -> Vec<(String, String)> {
        self.state.lock().cancelled.clone()
    }

    /// Number of placement calls.
    #[must_use]
    pub fn place_calls(&self) -> usize {
        self.state.lock().placed.len()
    }
}

#[async_trait]
impl BrokerGateway for MockGateway {
    async fn place_order(&self, order: &OrderRequest) -> Result<String, GatewayError> {
        let mut state = self.state.lock();
        state.placed.push(order.clone());
        let outcome = state.place_outcomes.pop_front().unwrap_or_else(|| {
            state.next_id += 1;
            Ok(format!("MOCK-{}", state.next_id))
        });
        if let Ok(order_id) = &outcome {
            state.issued.insert(order_id.clone(), order.clone());
        }
        outcome
    }

    async fn cancel_order(&self, order_id: &str, variety: &str) -> Result<bool, GatewayError> {
        let mut state = self.state.lock();
        state
            .cancelled
            .push((order_id.to_string(), variety.to_string()));
        let outcome = state.cancel_outcomes.pop_front().unwrap_or(Ok(true));
        if matches!(outcome, Ok(true)) {
            if let Some(entry) = state.order_book.iter_mut().find(|e| e.order_id == order_id) {
                if entry.status.is_cancelable() {
                    entry.status = OrderStatus::Cancelled;
                }
            }
        }
        outcome
    }

    async fn get_order_book(&self) -> Result<Vec<OrderBookEntry>, GatewayError> {
        let mut state = self.state.lock();
        if state.order_book_failures > 0 {
            state.order_book_failures -= 1;
            return Err(GatewayError::Network("connection reset".to_string()));
        }
        Ok(state.order_book.clone())
    }

    async fn get_positions(&self) -> Result<Vec<PositionBookEntry>, GatewayError> {
        Ok(self.state.lock().positions.clone())
    }

    async fn get_ltp(
        &self,
        _exchange: &str,
        symbol: &str,
        _token: &str,
    ) -> Result<Option<Decimal>, GatewayError> {
        Ok(self.state.lock().ltps.get(symbol).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderAction;
    use rust_decimal_macros::dec;

    fn order() -> OrderRequest {
        OrderRequest::market("BANKNIFTY24DEC50000CE", "12345", "NFO", OrderAction::Buy, 35)
    }

    #[tokio::test]
    async fn queued_outcomes_then_sequential_ids() {
        let gateway = MockGateway::new();
        gateway.push_rejection("Price out of band");

        assert!(gateway.place_order(&order()).await.is_err());
        assert_eq!(gateway.place_order(&order()).await.unwrap(), "MOCK-1");
        assert_eq!(gateway.place_order(&order()).await.unwrap(), "MOCK-2");
        assert_eq!(gateway.place_calls(), 3);
    }

    #[tokio::test]
    async fn cancel_marks_book_row() {
        let gateway = MockGateway::new();
        gateway.set_order_status("MOCK-9", OrderStatus::Open, 0, None);

        assert!(gateway.cancel_order("MOCK-9", "NORMAL").await.unwrap());
        let book = gateway.get_order_book().await.unwrap();
        assert_eq!(book[0].status, OrderStatus::Cancelled);
        assert_eq!(
            gateway.cancelled_orders(),
            vec![("MOCK-9".to_string(), "NORMAL".to_string())]
        );
    }

    #[tokio::test]
    async fn ltp_lookup_by_symbol() {
        let gateway = MockGateway::new();
        gateway.set_ltp("BANKNIFTY24DEC50000CE", dec!(101.5));
        let ltp = gateway
            .get_ltp("NFO", "BANKNIFTY24DEC50000CE", "12345")
            .await
            .unwrap();
        assert_eq!(ltp, Some(dec!(101.5)));
        assert_eq!(gateway.get_ltp("NFO", "OTHER", "1").await.unwrap(), None);
    }
}

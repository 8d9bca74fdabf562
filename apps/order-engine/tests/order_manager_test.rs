//! Order manager scenarios against scripted gateways.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use order_engine::error::ErrorCode;
use order_engine::gateway::mock::MockGateway;
use order_engine::gateway::{BrokerGateway, GatewayError};
use order_engine::models::{
    OrderAction, OrderBookEntry, OrderKind, OrderRequest, OrderStatus, Position, PositionBookEntry,
};
use order_engine::order_manager::{OrderManager, OrderManagerConfig, TradingMode};
use order_engine::partial_fill::{PartialFillConfig, PartialFillStrategy};
use order_engine::validation::ValidationConfig;

const SYMBOL: &str = "BANKNIFTY24DEC50000CE";

mock! {
    pub Broker {}

    #[async_trait]
    impl BrokerGateway for Broker {
        async fn place_order(&self, order: &OrderRequest) -> Result<String, GatewayError>;
        async fn cancel_order(&self, order_id: &str, variety: &str) -> Result<bool, GatewayError>;
        async fn get_order_book(&self) -> Result<Vec<OrderBookEntry>, GatewayError>;
        async fn get_positions(&self) -> Result<Vec<PositionBookEntry>, GatewayError>;
        async fn get_ltp(
            &self,
            exchange: &str,
            symbol: &str,
            token: &str,
        ) -> Result<Option<Decimal>, GatewayError>;
    }
}

fn config(mode: TradingMode) -> OrderManagerConfig {
    OrderManagerConfig {
        mode,
        validation: ValidationConfig {
            enforce_market_hours: false,
            ..ValidationConfig::default()
        },
        ..OrderManagerConfig::default()
    }
}

fn scripted(mode: TradingMode) -> (Arc<MockGateway>, Arc<OrderManager>) {
    let gateway = Arc::new(MockGateway::new());
    gateway.set_ltp(SYMBOL, dec!(100));
    let manager = Arc::new(OrderManager::new(gateway.clone(), config(mode)));
    (gateway, manager)
}

fn limit_buy(quantity: u32) -> OrderRequest {
    OrderRequest::limit(SYMBOL, "12345", "NFO", OrderAction::Buy, quantity, dec!(100))
}

fn market(action: OrderAction) -> OrderRequest {
    OrderRequest::market(SYMBOL, "12345", "NFO", action, 35)
}

#[tokio::test]
async fn off_lot_quantity_never_reaches_broker() {
    let mut broker = MockBroker::new();
    broker
        .expect_get_ltp()
        .returning(|_, _, _| Ok(Some(dec!(100))));
    broker.expect_place_order().never();

    let manager = OrderManager::new(Arc::new(broker), config(TradingMode::Live));
    let response = manager.place_order(&limit_buy(30)).await;

    assert_eq!(response.status, OrderStatus::Rejected);
    assert_eq!(response.error_code, Some(ErrorCode::ValidationError));
    assert!(response.message.starts_with("Validation failed:"));
    assert!(response.message.contains("lot size"));
}

#[tokio::test]
async fn out_of_range_price_rejected_without_ltp() {
    let mut broker = MockBroker::new();
    broker.expect_get_ltp().returning(|_, _, _| Ok(None));
    broker.expect_place_order().never();

    let manager = OrderManager::new(Arc::new(broker), config(TradingMode::Live));
    let mut order = limit_buy(35);
    order.price = Some(Decimal::MAX);
    let response = manager.place_order(&order).await;

    assert_eq!(response.status, OrderStatus::Rejected);
    assert_eq!(response.error_code, Some(ErrorCode::ValidationError));
    assert!(response.message.contains("above maximum"));
}

#[tokio::test]
async fn live_order_submitted_once_and_tracked() {
    let mut broker = MockBroker::new();
    broker
        .expect_get_ltp()
        .withf(|exchange, symbol, token| exchange == "NFO" && symbol == SYMBOL && token == "12345")
        .returning(|_, _, _| Ok(Some(dec!(100))));
    broker
        .expect_place_order()
        .withf(|order| order.quantity == 35 && order.kind == OrderKind::Limit)
        .times(1)
        .returning(|_| Ok("B-1".to_string()));
    broker
        .expect_cancel_order()
        .withf(|order_id, variety| order_id == "B-1" && variety == "NORMAL")
        .times(1)
        .returning(|_, _| Ok(true));

    let manager = OrderManager::new(Arc::new(broker), config(TradingMode::Live));
    let response = manager.place_order(&limit_buy(35)).await;

    assert!(response.is_success());
    assert_eq!(response.order_id.as_deref(), Some("B-1"));
    assert_eq!(manager.get_order_status("B-1"), Some(OrderStatus::Pending));

    assert!(manager.cancel_order("B-1").await);
    assert_eq!(manager.get_order_status("B-1"), Some(OrderStatus::Cancelled));
    assert!(manager.get_active_orders().is_empty());
}

#[tokio::test]
async fn ltp_failure_does_not_block_placement() {
    let mut broker = MockBroker::new();
    broker
        .expect_get_ltp()
        .returning(|_, _, _| Err(GatewayError::Timeout("quote".to_string())));
    broker
        .expect_place_order()
        .times(1)
        .returning(|_| Ok("B-7".to_string()));

    let manager = OrderManager::new(Arc::new(broker), config(TradingMode::Live));
    assert!(manager.place_order(&limit_buy(35)).await.is_success());
}

#[tokio::test(start_paused = true)]
async fn price_rejections_adjust_limit_until_accepted() {
    let (gateway, manager) = scripted(TradingMode::Live);
    gateway.push_rejection("Price outside band");
    gateway.push_rejection("Price outside band");

    let response = manager.place_order(&limit_buy(35)).await;

    assert!(response.is_success());
    let placed = gateway.placed_orders();
    assert_eq!(placed.len(), 3);
    let final_price = placed[2].price.unwrap();
    assert!(final_price > dec!(100));
    assert_eq!(final_price, dec!(110.25));

    let stats = manager.retry_statistics();
    assert_eq!(stats.fallbacks_used, 2);
    assert_eq!(stats.successful, 1);

    // the tracked request is the one that was finally accepted
    let order_id = response.order_id.unwrap();
    let tracked = manager.get_active_orders().remove(&order_id).unwrap();
    assert_eq!(tracked.request.price, Some(dec!(110.25)));
}

#[tokio::test(start_paused = true)]
async fn failed_stop_cancels_target_and_records_nothing() {
    let (gateway, manager) = scripted(TradingMode::Live);
    gateway.push_place_result(Ok("TGT-1".to_string()));
    for _ in 0..3 {
        gateway.push_rejection("Margin shortfall");
    }

    let position = Position::new(SYMBOL, "12345", "NFO", 35, dec!(100));
    let placed = manager.place_oco_orders(&position, dec!(110), dec!(90)).await;

    assert!(!placed);
    assert_eq!(
        gateway.cancelled_orders(),
        vec![("TGT-1".to_string(), "NORMAL".to_string())]
    );
    assert_eq!(manager.get_order_status("TGT-1"), Some(OrderStatus::Cancelled));
    assert!(manager.get_oco_orders().is_empty());

    let placed = gateway.placed_orders();
    assert_eq!(placed[0].kind, OrderKind::Limit);
    assert_eq!(placed[0].tag.as_deref(), Some("TARGET"));
    assert_eq!(placed[1].kind, OrderKind::StopLossMarket);
    assert_eq!(placed[1].tag.as_deref(), Some("STOP_LOSS"));
}

#[tokio::test]
async fn inverted_bracket_places_nothing() {
    let (gateway, manager) = scripted(TradingMode::Live);
    let position = Position::new(SYMBOL, "12345", "NFO", 35, dec!(100));

    assert!(!manager.place_oco_orders(&position, dec!(90), dec!(110)).await);
    assert_eq!(gateway.place_calls(), 0);
}

#[tokio::test]
async fn live_fill_sweeps_oco_sibling() {
    let (gateway, manager) = scripted(TradingMode::Live);
    let position = Position::new(SYMBOL, "12345", "NFO", 35, dec!(100));
    assert!(manager.place_oco_orders(&position, dec!(110), dec!(90)).await);

    // target MOCK-1 fills at the broker
    gateway.set_order_status("MOCK-1", OrderStatus::Open, 0, None);
    gateway.set_order_status("MOCK-2", OrderStatus::Open, 0, None);
    manager.run_monitor_cycle().await;
    gateway.set_order_status("MOCK-1", OrderStatus::Complete, 35, Some(dec!(110.10)));
    manager.run_monitor_cycle().await;

    assert_eq!(
        gateway.cancelled_orders(),
        vec![("MOCK-2".to_string(), "NORMAL".to_string())]
    );
    let oco = manager.get_oco_orders().remove("BANKNIFTY24DEC50000CE:NFO").unwrap();
    assert!(!oco.active);
    let history = manager.get_execution_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].price, dec!(110.10));

    // a second sweep does not cancel again
    manager.run_monitor_cycle().await;
    assert_eq!(gateway.cancelled_orders().len(), 1);
}

#[tokio::test]
async fn partial_fill_remainder_reprices_with_concession() {
    let gateway = Arc::new(MockGateway::new());
    gateway.set_ltp(SYMBOL, dec!(100));
    let manager = OrderManager::new(
        gateway.clone(),
        OrderManagerConfig {
            partial_fill: PartialFillConfig {
                strategy: PartialFillStrategy::PriceBased,
                price_concession: dec!(0.01),
                ..PartialFillConfig::default()
            },
            ..config(TradingMode::Live)
        },
    );

    let order_id = manager.place_order(&limit_buy(70)).await.order_id.unwrap();
    gateway.set_order_status(&order_id, OrderStatus::Partial, 35, Some(dec!(100)));
    manager.run_monitor_cycle().await;

    assert_eq!(manager.get_order_status(&order_id), Some(OrderStatus::Cancelled));
    let remainder = gateway.placed_orders().pop().unwrap();
    assert_eq!(remainder.kind, OrderKind::Limit);
    assert_eq!(remainder.quantity, 35);
    assert_eq!(remainder.price, Some(dec!(101.00)));
    assert_eq!(remainder.parent_order_id, Some(order_id));
    assert_eq!(manager.get_execution_history()[0].quantity, 35);
}

#[tokio::test]
async fn paper_round_trip_flattens_position() {
    let (gateway, manager) = scripted(TradingMode::Paper);

    let buy = manager.place_order(&market(OrderAction::Buy)).await;
    assert_eq!(buy.status, OrderStatus::Complete);
    assert_eq!(buy.average_price, Some(dec!(100.20)));
    assert_eq!(manager.get_positions().await.len(), 1);

    let sell = manager.place_order(&market(OrderAction::Sell)).await;
    assert_eq!(sell.average_price, Some(dec!(99.80)));

    assert!(manager.get_positions().await.is_empty());
    assert_eq!(manager.get_execution_history().len(), 2);
    assert_eq!(gateway.place_calls(), 0);
}

#[tokio::test]
async fn paper_stop_rests_until_crossed() {
    let (gateway, manager) = scripted(TradingMode::Paper);
    manager.place_order(&market(OrderAction::Buy)).await;

    let stop =
        OrderRequest::stop_loss(SYMBOL, "12345", "NFO", OrderAction::Sell, 35, dec!(95), None);
    let response = manager.place_order(&stop).await;
    let stop_id = response.order_id.unwrap();
    assert_eq!(response.status, OrderStatus::Pending);

    manager.run_monitor_cycle().await;
    assert_eq!(manager.get_order_status(&stop_id), Some(OrderStatus::Pending));

    gateway.set_ltp(SYMBOL, dec!(94));
    manager.run_monitor_cycle().await;
    assert_eq!(manager.get_order_status(&stop_id), Some(OrderStatus::Complete));
    assert!(manager.get_positions().await.is_empty());
    assert_eq!(manager.get_execution_history()[1].price, dec!(95));
}

#[tokio::test]
async fn paper_oco_target_fill_cancels_resting_stop() {
    let (_, manager) = scripted(TradingMode::Paper);
    manager.place_order(&market(OrderAction::Buy)).await;
    let position = manager.get_positions().await.remove(0);

    assert!(manager.place_oco_orders(&position, dec!(110), dec!(90)).await);
    let oco = manager.get_oco_orders().remove(&position.key()).unwrap();
    // paper limits fill on placement; the stop rests
    assert_eq!(manager.get_order_status(&oco.target_order_id), Some(OrderStatus::Complete));
    assert_eq!(manager.get_order_status(&oco.stop_order_id), Some(OrderStatus::Pending));

    manager.run_monitor_cycle().await;
    assert_eq!(manager.get_order_status(&oco.stop_order_id), Some(OrderStatus::Cancelled));
    assert_eq!(manager.exposure_snapshot().active_oco_orders, 0);
}

#[tokio::test]
async fn exposure_reflects_paper_book() {
    let (gateway, manager) = scripted(TradingMode::Paper);
    manager.place_order(&market(OrderAction::Buy)).await;
    gateway.set_ltp(SYMBOL, dec!(110));
    manager.run_monitor_cycle().await;

    let exposure = manager.exposure_snapshot();
    assert_eq!(exposure.mode, TradingMode::Paper);
    assert_eq!(exposure.positions.len(), 1);
    // bought at 100.20, marked at 110
    assert_eq!(exposure.unrealized_pnl, dec!(343.00));
    assert_eq!(exposure.active_orders, 0);
}

#[tokio::test]
async fn closed_round_trip_stays_in_realized_pnl() {
    let (_, manager) = scripted(TradingMode::Paper);
    let sell = OrderRequest::limit(SYMBOL, "12345", "NFO", OrderAction::Sell, 35, dec!(110));

    assert!(manager.place_order(&limit_buy(35)).await.is_success());
    assert!(manager.place_order(&sell).await.is_success());

    let exposure = manager.exposure_snapshot();
    assert!(exposure.positions.is_empty());
    assert_eq!(exposure.realized_pnl, dec!(350));
    assert_eq!(exposure.unrealized_pnl, Decimal::ZERO);
}

#[tokio::test(start_paused = true)]
async fn monitoring_loop_starts_once_and_stops() {
    let (_, manager) = scripted(TradingMode::Paper);
    manager.start_monitoring();
    manager.start_monitoring();
    assert!(manager.is_monitoring());
    manager.stop_monitoring();
    assert!(!manager.is_monitoring());
}

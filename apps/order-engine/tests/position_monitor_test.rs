//! Position monitor exits and risk limits over a paper order manager.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast::error::TryRecvError;

use order_engine::gateway::mock::MockGateway;
use order_engine::models::{
    CloseReason, OptionType, OrderAction, SignalLeg, Trade, TradeLeg, TradeSignal, TradeStatus,
};
use order_engine::order_manager::{OrderManager, OrderManagerConfig, TradingMode};
use order_engine::position_monitor::{MonitorEvent, PositionMonitor, PositionMonitorConfig};
use order_engine::validation::ValidationConfig;

const SYMBOL: &str = "BANKNIFTY24DEC50000CE";

struct Harness {
    gateway: Arc<MockGateway>,
    orders: Arc<OrderManager>,
    monitor: Arc<PositionMonitor>,
}

fn harness(config: PositionMonitorConfig) -> Harness {
    let gateway = Arc::new(MockGateway::new());
    gateway.set_ltp(SYMBOL, dec!(100));
    let orders = Arc::new(OrderManager::new(
        gateway.clone(),
        OrderManagerConfig {
            mode: TradingMode::Paper,
            validation: ValidationConfig {
                enforce_market_hours: false,
                ..ValidationConfig::default()
            },
            ..OrderManagerConfig::default()
        },
    ));
    let monitor = Arc::new(PositionMonitor::new(Arc::clone(&orders), config));
    Harness {
        gateway,
        orders,
        monitor,
    }
}

fn long_call(id: &str, target: Decimal, stop: Decimal) -> Trade {
    Trade::new(
        id,
        "long_call",
        vec![TradeLeg {
            symbol: SYMBOL.to_string(),
            token: "12345".to_string(),
            exchange: "NFO".to_string(),
            strike: dec!(50000),
            option_type: OptionType::Call,
            action: OrderAction::Buy,
            quantity: 35,
            entry_price: dec!(100),
            current_price: dec!(100),
            exit_order_id: None,
            exit_price: None,
        }],
        target,
        stop,
    )
}

fn mark(price: Decimal) -> HashMap<String, Decimal> {
    HashMap::from([(SYMBOL.to_string(), price)])
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
}

#[tokio::test]
async fn target_hit_closes_exactly_once() {
    let h = harness(PositionMonitorConfig::default());
    let mut rx = h.monitor.subscribe();
    h.monitor.add_trade(long_call("T1", dec!(300), dec!(-1000))).await;

    h.gateway.set_ltp(SYMBOL, dec!(110));
    h.monitor.update_trade_prices("T1", &mark(dec!(110))).await;
    h.monitor.update_trade_prices("T1", &mark(dec!(112))).await;
    h.monitor.run_cycle().await;

    let trade = h.monitor.get_trade("T1").unwrap();
    assert_eq!(trade.status, TradeStatus::Closed);
    assert_eq!(trade.close_reason, Some(CloseReason::TargetHit));
    // sold at 110 less 0.2% slippage
    assert_eq!(trade.realized_pnl, dec!(342.30));

    let executions = h.orders.get_execution_history();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].action, OrderAction::Sell);

    let names: Vec<_> = drain(&mut rx).iter().map(MonitorEvent::name).collect();
    assert_eq!(names, vec!["target_hit", "trade_closed"]);
}

#[tokio::test]
async fn daily_loss_sweep_closes_every_open_trade() {
    let h = harness(PositionMonitorConfig::default());
    let mut rx = h.monitor.subscribe();
    for id in ["T1", "T2", "T3"] {
        // stops far away: only the aggregate limit can fire
        h.monitor.add_trade(long_call(id, dec!(5000), dec!(-10000))).await;
        h.monitor.update_trade_prices(id, &mark(dec!(40))).await;
    }
    assert_eq!(h.monitor.daily_pnl(), dec!(-6300));
    assert!(h.monitor.get_trade("T1").unwrap().is_open());

    h.gateway.set_ltp(SYMBOL, dec!(40));
    h.monitor.run_cycle().await;

    for id in ["T1", "T2", "T3"] {
        let trade = h.monitor.get_trade(id).unwrap();
        assert_eq!(trade.status, TradeStatus::Closed, "{id}");
        assert_eq!(trade.close_reason, Some(CloseReason::DailyLossLimit), "{id}");
    }
    assert!(h.monitor.open_trades().is_empty());
    assert_eq!(h.orders.get_execution_history().len(), 3);

    let events = drain(&mut rx);
    assert!(matches!(events[0], MonitorEvent::RiskAlert(_)));
    let closed = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                MonitorEvent::TradeClosed {
                    reason: CloseReason::DailyLossLimit,
                    ..
                }
            )
        })
        .count();
    assert_eq!(closed, 3);

    let summary = h.monitor.position_summary();
    assert_eq!(summary.total_trades, 3);
    assert_eq!(summary.losing_trades, 3);
}

#[tokio::test]
async fn closing_a_closed_trade_is_a_no_op() {
    let h = harness(PositionMonitorConfig::default());
    h.monitor.add_trade(long_call("T1", dec!(2000), dec!(-1000))).await;

    assert!(h.monitor.close_trade("T1", CloseReason::Manual).await);
    let closed = h.monitor.get_trade("T1").unwrap();

    assert!(!h.monitor.close_trade("T1", CloseReason::Emergency).await);
    assert_eq!(h.monitor.get_trade("T1").unwrap(), closed);
    assert_eq!(h.orders.get_execution_history().len(), 1);
    assert!(!h.monitor.close_trade("missing", CloseReason::Manual).await);
}

#[tokio::test]
async fn concurrent_closes_submit_one_exit() {
    let h = harness(PositionMonitorConfig::default());
    h.monitor.add_trade(long_call("T1", dec!(2000), dec!(-1000))).await;

    let (a, b) = tokio::join!(
        h.monitor.close_trade("T1", CloseReason::Manual),
        h.monitor.close_trade("T1", CloseReason::Manual),
    );

    assert!(a ^ b);
    assert_eq!(h.orders.get_execution_history().len(), 1);
}

#[tokio::test]
async fn opened_trade_is_monitored_to_its_stop() {
    let h = harness(PositionMonitorConfig::default());
    h.gateway.set_ltp(SYMBOL, dec!(200));
    let signal = TradeSignal {
        strategy_name: "short_call".to_string(),
        legs: vec![SignalLeg {
            symbol: SYMBOL.to_string(),
            token: "12345".to_string(),
            exchange: "NFO".to_string(),
            strike: dec!(50000),
            option_type: OptionType::Call,
            action: OrderAction::Sell,
            quantity: 35,
            price: None,
        }],
        target_pnl: dec!(2000),
        stop_loss_pnl: dec!(-1000),
    };
    let trade = h.orders.open_trade(&signal).await.unwrap();
    let trade_id = trade.id.clone();
    h.monitor.add_trade(trade).await;

    // short from 199.60; 40 points against is -1400
    h.gateway.set_ltp(SYMBOL, dec!(239.60));
    h.orders.run_monitor_cycle().await;
    h.monitor.run_cycle().await;

    let trade = h.monitor.get_trade(&trade_id).unwrap();
    assert_eq!(trade.close_reason, Some(CloseReason::StopLoss));
    assert!(h.orders.get_positions().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn background_loop_applies_exits() {
    let h = harness(PositionMonitorConfig {
        interval_ms: 1_000,
        ..PositionMonitorConfig::default()
    });
    let mut trade = long_call("T1", dec!(2000), dec!(-1000));
    trade.legs[0].current_price = dec!(60);
    h.gateway.set_ltp(SYMBOL, dec!(60));
    h.monitor.add_trade(trade).await;

    h.monitor.start_monitoring();
    assert!(h.monitor.is_monitoring());
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(
        h.monitor.get_trade("T1").unwrap().close_reason,
        Some(CloseReason::StopLoss)
    );
    h.monitor.stop_monitoring();
    assert!(!h.monitor.is_monitoring());
}

//! Opening multi-leg trades from strategy signals.

use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::OrderManager;
use crate::error::TradeError;
use crate::models::{
    OrderRequest, OrderResponse, OrderStatus, SignalLeg, Trade, TradeLeg, TradeSignal,
};

impl OrderManager {
    /// Place one order per signal leg and return the opened trade.
    ///
    /// Legs are placed in order. If any leg fails, legs already placed are
    /// unwound: filled legs are offset at market, working legs cancelled.
    pub async fn open_trade(&self, signal: &TradeSignal) -> Result<Trade, TradeError> {
        if signal.legs.is_empty() {
            return Err(TradeError::EmptySignal(signal.strategy_name.clone()));
        }

        let trade_id = Uuid::new_v4().to_string();
        let mut placed: Vec<(OrderRequest, OrderResponse)> = Vec::with_capacity(signal.legs.len());
        let mut legs = Vec::with_capacity(signal.legs.len());

        for (index, leg) in signal.legs.iter().enumerate() {
            let order = leg_order(leg)
                .with_trade(trade_id.clone(), index)
                .with_strategy(signal.strategy_name.clone());
            let response = self.place_order(&order).await;

            if !response.is_success() {
                error!(
                    trade_id = %trade_id,
                    leg = index,
                    symbol = %leg.symbol,
                    message = %response.message,
                    "Trade leg failed, unwinding"
                );
                self.unwind(&placed).await;
                return Err(TradeError::LegFailed {
                    leg_index: index,
                    symbol: leg.symbol.clone(),
                    message: response.message,
                });
            }

            let entry_price = match response.average_price.or(order.price) {
                Some(price) => price,
                None => self
                    .gateway
                    .get_ltp(&leg.exchange, &leg.symbol, &leg.token)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(Decimal::ZERO),
            };
            legs.push(TradeLeg {
                symbol: leg.symbol.clone(),
                token: leg.token.clone(),
                exchange: leg.exchange.clone(),
                strike: leg.strike,
                option_type: leg.option_type,
                action: leg.action,
                quantity: leg.quantity,
                entry_price,
                current_price: entry_price,
                exit_order_id: None,
                exit_price: None,
            });
            placed.push((order, response));
        }

        info!(
            trade_id = %trade_id,
            strategy = %signal.strategy_name,
            legs = legs.len(),
            "Trade opened"
        );
        Ok(Trade::new(
            trade_id,
            signal.strategy_name.clone(),
            legs,
            signal.target_pnl,
            signal.stop_loss_pnl,
        ))
    }

    async fn unwind(&self, placed: &[(OrderRequest, OrderResponse)]) {
        for (order, response) in placed.iter().rev() {
            let Some(order_id) = response.order_id.as_deref() else {
                continue;
            };
            let status = self.get_order_status(order_id).unwrap_or(response.status);

            if status == OrderStatus::Complete {
                let mut offset = OrderRequest::market(
                    order.symbol.clone(),
                    order.token.clone(),
                    order.exchange.clone(),
                    order.action.opposite(),
                    order.quantity,
                );
                offset.product.clone_from(&order.product);
                offset.trade_id.clone_from(&order.trade_id);
                offset.leg_index = order.leg_index;
                offset.parent_order_id = Some(order_id.to_string());
                offset.tag = Some("UNWIND".to_string());

                let result = self.place_order(&offset).await;
                if !result.is_success() {
                    error!(order_id, message = %result.message, "Failed to offset filled leg");
                }
            } else if !self.cancel_order(order_id).await {
                warn!(order_id, "Failed to cancel leg during unwind");
            }
        }
    }
}

fn leg_order(leg: &SignalLeg) -> OrderRequest {
    match leg.price {
        Some(price) => OrderRequest::limit(
            leg.symbol.clone(),
            leg.token.clone(),
            leg.exchange.clone(),
            leg.action,
            leg.quantity,
            price,
        ),
        None => OrderRequest::market(
            leg.symbol.clone(),
            leg.token.clone(),
            leg.exchange.clone(),
            leg.action,
            leg.quantity,
        ),
    }
}

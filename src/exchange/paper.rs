//! In-memory paper exchange used by PAPER/BACKTEST modes and by tests.
//! Order placement is a no-op that records a synthetic fill at the
//! requested (or last known) price.

use crate::error::ExchangeError;
use crate::exchange::{
    ExchangeAdapter, OrderAck, OrderBookUpdate, OrderRequest, TickerUpdate, Timeframe, TradeUpdate,
};
use crate::models::Ohlcv;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 256;

pub struct PaperExchange {
    prices: Mutex<HashMap<String, f64>>,
    history: Mutex<HashMap<String, Vec<Ohlcv>>>,
    balances: Mutex<HashMap<String, (f64, f64)>>,
    next_order_id: Mutex<u64>,
    ticker_tx: Mutex<HashMap<String, broadcast::Sender<TickerUpdate>>>,
    trade_tx: Mutex<HashMap<String, broadcast::Sender<TradeUpdate>>>,
    order_book_tx: Mutex<HashMap<String, broadcast::Sender<OrderBookUpdate>>>,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            next_order_id: Mutex::new(1),
            ticker_tx: Mutex::new(HashMap::new()),
            trade_tx: Mutex::new(HashMap::new()),
            order_book_tx: Mutex::new(HashMap::new()),
        }
    }

    /// Updates the last-known price and, if anyone is subscribed, pushes a
    /// ticker update. Synthetic sends: no reconnect/backoff machinery,
    /// since this adapter has no real upstream.
    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().insert(symbol.to_string(), price);
        if let Some(tx) = self.ticker_tx.lock().get(symbol) {
            let _ = tx.send(TickerUpdate {
                symbol: symbol.to_string(),
                price,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
    }

    /// Publishes a synthetic trade print to `symbol`'s subscribers, if any.
    pub fn push_trade(&self, symbol: &str, price: f64, quantity: f64, side: crate::exchange::OrderSide) {
        if let Some(tx) = self.trade_tx.lock().get(symbol) {
            let _ = tx.send(TradeUpdate {
                symbol: symbol.to_string(),
                price,
                quantity,
                side,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
    }

    /// Publishes a synthetic order-book top-of-book update to `symbol`'s
    /// subscribers, if any.
    pub fn push_order_book(&self, symbol: &str, best_bid: f64, best_ask: f64) {
        if let Some(tx) = self.order_book_tx.lock().get(symbol) {
            let _ = tx.send(OrderBookUpdate {
                symbol: symbol.to_string(),
                best_bid,
                best_ask,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
    }

    pub fn set_history(&self, symbol: &str, bars: Vec<Ohlcv>) {
        self.history.lock().insert(symbol.to_string(), bars);
    }

    pub fn set_balance(&self, asset: &str, free: f64, locked: f64) {
        self.balances.lock().insert(asset.to_string(), (free, locked));
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    async fn get_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.prices
            .lock()
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }

    async fn get_historical_data(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, ExchangeError> {
        let history = self.history.lock();
        let bars = history
            .get(symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        let start = bars.len().saturating_sub(limit);
        Ok(bars[start..].to_vec())
    }

    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck, ExchangeError> {
        let price = self
            .prices
            .lock()
            .get(&order.symbol)
            .copied()
            .or(order.price)
            .ok_or_else(|| ExchangeError::UnknownSymbol(order.symbol.clone()))?;
        let mut next_id = self.next_order_id.lock();
        let order_id = format!("paper-{}", *next_id);
        *next_id += 1;
        tracing::debug!(symbol = %order.symbol, price, qty = order.quantity, "paper fill recorded");
        Ok(OrderAck {
            order_id,
            status: "FILLED".to_string(),
            filled_qty: order.quantity,
        })
    }

    async fn cancel_order(&self, _order_id: &str, _symbol: &str) -> Result<bool, ExchangeError> {
        Ok(true)
    }

    async fn get_balance(&self, asset: &str) -> Result<(f64, f64), ExchangeError> {
        Ok(self.balances.lock().get(asset).copied().unwrap_or((0.0, 0.0)))
    }

    fn subscribe_ticker(&self, symbol: &str) -> broadcast::Receiver<TickerUpdate> {
        self.ticker_tx
            .lock()
            .entry(symbol.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn subscribe_trades(&self, symbol: &str) -> broadcast::Receiver<TradeUpdate> {
        self.trade_tx
            .lock()
            .entry(symbol.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn subscribe_order_book(&self, symbol: &str) -> broadcast::Receiver<OrderBookUpdate> {
        self.order_book_tx
            .lock()
            .entry(symbol.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticker_subscription_receives_price_pushes() {
        let exchange = PaperExchange::new();
        let mut rx = exchange.subscribe_ticker("BTC/USDT");
        exchange.set_price("BTC/USDT", 42000.0);
        let update = rx.recv().await.expect("ticker update delivered");
        assert_eq!(update.symbol, "BTC/USDT");
        assert_eq!(update.price, 42000.0);
    }

    #[tokio::test]
    async fn order_book_subscription_receives_pushes() {
        let exchange = PaperExchange::new();
        let mut rx = exchange.subscribe_order_book("ETH/USDT");
        exchange.push_order_book("ETH/USDT", 2999.5, 3000.5);
        let update = rx.recv().await.expect("order book update delivered");
        assert_eq!(update.best_bid, 2999.5);
        assert_eq!(update.best_ask, 3000.5);
    }
}

//! External exchange adapter contract.
//!
//! Individual exchange REST/WS clients are out of scope; the core depends
//! only on this capability.

pub mod paper;

use crate::error::ExchangeError;
use crate::models::Ohlcv;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
    pub filled_qty: f64,
}

/// Timeframes accepted by the core; adapters translate to upstream-specific
/// strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

/// Long-lived push events for the three subscription channels. Reactive
/// consumers get a `broadcast::Receiver`, matching the teacher's WS feed
/// idiom (`scrapers/binance_price_feed.rs`'s `update_tx: broadcast::Sender`).
#[derive(Debug, Clone)]
pub struct TickerUpdate {
    pub symbol: String,
    pub price: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct TradeUpdate {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub side: OrderSide,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct OrderBookUpdate {
    pub symbol: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub timestamp: i64,
}

#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    async fn get_price(&self, symbol: &str) -> Result<f64, ExchangeError>;

    async fn get_historical_data(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, ExchangeError>;

    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck, ExchangeError>;

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<bool, ExchangeError>;

    async fn get_balance(&self, asset: &str) -> Result<(f64, f64), ExchangeError>;

    /// Subscribes to ticker pushes for `symbol`. The subscription is
    /// long-lived: the returned receiver keeps yielding updates until
    /// dropped or the adapter shuts down.
    fn subscribe_ticker(&self, symbol: &str) -> broadcast::Receiver<TickerUpdate>;

    fn subscribe_trades(&self, symbol: &str) -> broadcast::Receiver<TradeUpdate>;

    fn subscribe_order_book(&self, symbol: &str) -> broadcast::Receiver<OrderBookUpdate>;
}

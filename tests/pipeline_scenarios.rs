//! End-to-end pipeline scenarios: Fibonacci detection through validation,
//! scoring, AI enhancement, execution and the open-trade lifecycle.

use async_trait::async_trait;
use confluence_signal_engine::ai::ensemble::EnsembleOrchestrator;
use confluence_signal_engine::ai::provider::AiProvider;
use confluence_signal_engine::ai::types::{AnalysisKind, AnalyzeOptions, ProviderStats};
use confluence_signal_engine::config::PipelineConfig;
use confluence_signal_engine::exchange::paper::PaperExchange;
use confluence_signal_engine::exchange::ExchangeAdapter;
use confluence_signal_engine::execution::{ExecutionEngine, MarketSnapshot};
use confluence_signal_engine::models::{AiResponse, AiSignal, MarketContext, Direction, Ohlcv, RiskLevel};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SYMBOL: &str = "BTC/USDT";

fn bar(h: f64, l: f64, c: f64) -> Ohlcv {
    Ohlcv { timestamp: 0, open: c, high: h, low: l, close: c, volume: 1600.0 }
}

/// A window that trips the dynamic-Fibonacci support_strong anchor for a
/// LONG setup: twenty flat bars followed by one dip to the support level.
fn long_setup_window() -> Vec<Ohlcv> {
    let mut window = vec![bar(42050.0, 41950.0, 42000.0); 20];
    window.push(bar(42050.0, 41950.0, 41988.0));
    window
}

fn strong_long_market() -> MarketContext {
    MarketContext {
        rsi: 22.0,
        ema_20: 41900.0,
        ema_50: 41800.0,
        ema_200: 41000.0,
        volume: 1700.0,
        avg_volume: 1000.0,
        atr: 450.0,
        market_volatility: 0.8,
        trend_direction: Some(Direction::Long),
    }
}

fn snapshot(market: MarketContext) -> MarketSnapshot {
    MarketSnapshot {
        context: market,
        portfolio: None,
        order_book: Some((41999.0, 42001.0)),
        historical_win_rate: 0.72,
        measured_latency_ms: 50,
    }
}

fn base_config(ai_enabled: bool, min_providers: usize) -> PipelineConfig {
    let mut config = PipelineConfig::from_env().expect("default config loads");
    config.ai_enabled = ai_enabled;
    config.min_providers = min_providers;
    config.providers = vec![];
    config
}

fn engine_with(config: PipelineConfig, orchestrator: Option<Arc<EnsembleOrchestrator>>) -> ExecutionEngine {
    let exchange: Arc<dyn ExchangeAdapter> = Arc::new(PaperExchange::new());
    ExecutionEngine::new(Arc::new(config), orchestrator, exchange)
}

struct FakeProvider(AiResponse);

#[async_trait]
impl AiProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }
    async fn analyze(&self, _prompt: &str, _kind: AnalysisKind, _options: &AnalyzeOptions) -> AiResponse {
        self.0.clone()
    }
    fn get_stats(&self) -> ProviderStats {
        ProviderStats::default()
    }
    fn reset_stats(&self) {}
}

fn orchestrator_with(responses: Vec<AiResponse>, min_providers: usize) -> Arc<EnsembleOrchestrator> {
    let providers: Vec<(String, Box<dyn AiProvider>)> = responses
        .into_iter()
        .enumerate()
        .map(|(i, response)| {
            (format!("provider_{i}"), Box::new(FakeProvider(response)) as Box<dyn AiProvider>)
        })
        .collect();
    Arc::new(EnsembleOrchestrator::new(providers, HashMap::new(), min_providers, true))
}

/// S1 — a valid LONG setup clears validation and scoring, and a matching
/// two-provider BUY consensus boosts its confidence into a FULL-tier trade.
#[tokio::test]
async fn s1_valid_long_passes_pipeline_and_is_boosted() {
    let buy = AiResponse {
        content: "ok".into(),
        confidence: 0.85,
        signal: Some(AiSignal::Buy),
        risk_level: Some(RiskLevel::Low),
        ..Default::default()
    };
    let orchestrator = orchestrator_with(vec![buy.clone(), buy], 2);
    let config = base_config(true, 2);
    let engine = engine_with(config, Some(orchestrator));

    let window = long_setup_window();
    let snap = snapshot(strong_long_market());
    let signal = engine
        .evaluate_signal(SYMBOL, &window, &snap, 0, &CancellationToken::new())
        .await
        .expect("candidate should clear the pipeline");

    assert_eq!(signal.direction, Direction::Long);
    assert_eq!(signal.tier, confluence_signal_engine::models::ExecutionTier::Full);
    let metadata = signal.ai_metadata.as_ref().expect("ai metadata set");
    assert!(metadata.boosted);
    assert!(signal.stop_loss < signal.entry_price);
    assert!(signal.entry_price < signal.tp1);
    assert!(signal.tp1 < signal.tp2);
    assert_eq!(engine.stats().signals_ai_boosted, 1);
}

/// S2 — a consensus HOLD at high confidence and HIGH risk blocks the
/// signal outright.
#[tokio::test]
async fn s2_ai_blocks_on_hold_high_risk_consensus() {
    let hold = AiResponse {
        content: "ok".into(),
        confidence: 0.85,
        signal: Some(AiSignal::Hold),
        risk_level: Some(RiskLevel::High),
        ..Default::default()
    };
    let orchestrator = orchestrator_with(vec![hold.clone(), hold], 2);
    let config = base_config(true, 2);
    let engine = engine_with(config, Some(orchestrator));

    let window = long_setup_window();
    let snap = snapshot(strong_long_market());
    let signal = engine
        .evaluate_signal(SYMBOL, &window, &snap, 0, &CancellationToken::new())
        .await;

    assert!(signal.is_none());
    assert_eq!(engine.stats().signals_ai_blocked, 1);
}

/// S3 — only one provider responds against a quorum of two: the ensemble
/// is neutral and the technical signal passes through unchanged.
#[tokio::test]
async fn s3_insufficient_quorum_leaves_signal_neutral() {
    let buy = AiResponse {
        content: "ok".into(),
        confidence: 0.85,
        signal: Some(AiSignal::Buy),
        risk_level: Some(RiskLevel::Low),
        ..Default::default()
    };
    let orchestrator = orchestrator_with(vec![buy], 2);
    let config = base_config(true, 2);
    let engine = engine_with(config, Some(orchestrator));

    let window = long_setup_window();
    let snap = snapshot(strong_long_market());
    let technical_only_confidence = {
        let validator = confluence_signal_engine::signals::SignalValidator::default();
        let fib = confluence_signal_engine::signals::FibonacciEngine::new(14, 0.5);
        let candidate = fib.get_signal(SYMBOL, &window).expect("candidate triggers");
        validator.validate(&candidate, &snap.context, 1000.0, None).confidence
    };

    let signal = engine
        .evaluate_signal(SYMBOL, &window, &snap, 0, &CancellationToken::new())
        .await
        .expect("quorum failure still emits the technical signal");

    assert!((signal.confidence - technical_only_confidence).abs() < 1e-9);
    assert!(signal.ai_metadata.is_none());
    assert_eq!(engine.stats().signals_ai_neutral, 1);
}

/// S4 — enough conditions fail confluence (RSI out of band, volume
/// unconfirmed, EMA misaligned) that the validator's 100·(passed/7)
/// confidence drops under the 60 threshold; the scheduler records a skip.
/// RSI failing alone (one condition out of seven) still clears 60% and is
/// covered separately by `signals::validator::rsi_out_of_band_drops_below_threshold`.
#[tokio::test]
async fn s4_validator_rejects_below_confluence_threshold_and_records_skip() {
    let config = base_config(false, 1);
    let engine = engine_with(config, None);

    let window = long_setup_window();
    let mut market = strong_long_market();
    market.rsi = 65.0;
    market.volume = market.avg_volume;
    market.ema_20 = 42100.0;
    let snap = snapshot(market);

    let signal = engine
        .evaluate_signal(SYMBOL, &window, &snap, 0, &CancellationToken::new())
        .await;

    assert!(signal.is_none());
    assert_eq!(engine.scheduler().consecutive_skips(SYMBOL), 1);
}

/// S5 — two ticks for the same symbol sixty seconds apart: only the first
/// opens a trade, the second is rejected by the scheduler's cooldown.
#[tokio::test]
async fn s5_scheduler_cooldown_blocks_second_tick() {
    let exchange: Arc<dyn ExchangeAdapter> = Arc::new(PaperExchange::new());
    let engine = ExecutionEngine::new(Arc::new(base_config(false, 1)), None, exchange);

    let window = long_setup_window();
    let snap = snapshot(strong_long_market());
    let cancel = CancellationToken::new();

    let first = engine.tick(SYMBOL, &window, &snap, 0, &cancel).await.expect("first tick succeeds");
    assert!(first.is_some(), "first tick should open a trade");
    assert_eq!(engine.open_trade_count().await, 1);

    let second = engine.tick(SYMBOL, &window, &snap, 60, &cancel).await.expect("second tick succeeds");
    assert!(second.is_none(), "cooldown should reject the second tick");
    assert_eq!(engine.open_trade_count().await, 1);
}

/// S6 — an open LONG trade takes its partial at TP1, gives back to
/// breakeven, then closes on the stop-loss.
#[tokio::test]
async fn s6_partial_exit_then_stop_loss() {
    let config = base_config(false, 1);
    let exchange: Arc<dyn ExchangeAdapter> = Arc::new(PaperExchange::new());
    let engine = ExecutionEngine::new(Arc::new(config), None, exchange);

    let window = long_setup_window();
    let snap = snapshot(strong_long_market());
    let signal = engine
        .evaluate_signal(SYMBOL, &window, &snap, 0, &CancellationToken::new())
        .await
        .expect("setup clears the pipeline");
    let trade = engine.execute_signal(&signal, 0).await.expect("order places").expect("trade opens");

    let mut prices = HashMap::new();
    prices.insert(SYMBOL.to_string(), trade.tp1);
    let closed = engine.update_trades(&prices).await;
    assert!(closed.is_empty(), "TP1 only partials, it doesn't close the trade");
    let partial = engine.open_trade_for(SYMBOL).await.expect("still open");
    assert!(partial.partial_1_taken);

    prices.insert(SYMBOL.to_string(), trade.entry_price);
    let closed = engine.update_trades(&prices).await;
    assert!(closed.is_empty());

    prices.insert(SYMBOL.to_string(), trade.stop_loss);
    let closed = engine.update_trades(&prices).await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].exit_reason.as_deref(), Some("sl"));
    assert_eq!(engine.open_trade_count().await, 0);
    assert_eq!(engine.closed_trades().len(), 1);
}

struct CountingExchange {
    inner: PaperExchange,
    place_order_calls: std::sync::atomic::AtomicU64,
}

impl CountingExchange {
    fn new() -> Self {
        let inner = PaperExchange::new();
        inner.set_price(SYMBOL, 42000.0);
        Self { inner, place_order_calls: std::sync::atomic::AtomicU64::new(0) }
    }
}

#[async_trait]
impl ExchangeAdapter for CountingExchange {
    async fn get_price(&self, symbol: &str) -> Result<f64, confluence_signal_engine::error::ExchangeError> {
        self.inner.get_price(symbol).await
    }
    async fn get_historical_data(
        &self,
        symbol: &str,
        timeframe: confluence_signal_engine::exchange::Timeframe,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, confluence_signal_engine::error::ExchangeError> {
        self.inner.get_historical_data(symbol, timeframe, limit).await
    }
    async fn place_order(
        &self,
        order: confluence_signal_engine::exchange::OrderRequest,
    ) -> Result<confluence_signal_engine::exchange::OrderAck, confluence_signal_engine::error::ExchangeError> {
        self.place_order_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.place_order(order).await
    }
    async fn cancel_order(
        &self,
        order_id: &str,
        symbol: &str,
    ) -> Result<bool, confluence_signal_engine::error::ExchangeError> {
        self.inner.cancel_order(order_id, symbol).await
    }
    async fn get_balance(&self, asset: &str) -> Result<(f64, f64), confluence_signal_engine::error::ExchangeError> {
        self.inner.get_balance(asset).await
    }
    fn subscribe_ticker(
        &self,
        symbol: &str,
    ) -> tokio::sync::broadcast::Receiver<confluence_signal_engine::exchange::TickerUpdate> {
        self.inner.subscribe_ticker(symbol)
    }
    fn subscribe_trades(
        &self,
        symbol: &str,
    ) -> tokio::sync::broadcast::Receiver<confluence_signal_engine::exchange::TradeUpdate> {
        self.inner.subscribe_trades(symbol)
    }
    fn subscribe_order_book(
        &self,
        symbol: &str,
    ) -> tokio::sync::broadcast::Receiver<confluence_signal_engine::exchange::OrderBookUpdate> {
        self.inner.subscribe_order_book(symbol)
    }
}

/// S7 — a second `execute_signal` for a symbol with an already-open trade
/// must not reach the exchange at all; the open-trade check happens before
/// the order is placed, not after.
#[tokio::test]
async fn s7_duplicate_execute_signal_never_double_places_order() {
    let config = base_config(false, 1);
    let exchange = Arc::new(CountingExchange::new());
    let engine = ExecutionEngine::new(Arc::new(config), None, exchange.clone() as Arc<dyn ExchangeAdapter>);

    let window = long_setup_window();
    let snap = snapshot(strong_long_market());
    let signal = engine
        .evaluate_signal(SYMBOL, &window, &snap, 0, &CancellationToken::new())
        .await
        .expect("setup clears the pipeline");

    let first = engine.execute_signal(&signal, 0).await.expect("order places");
    assert!(first.is_some());
    let second = engine.execute_signal(&signal, 0).await.expect("no exchange error");
    assert!(second.is_none(), "duplicate open trade must be rejected");

    assert_eq!(exchange.place_order_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

//! Integrated execution engine: Fibonacci -> Validator -> Scheduler ->
//! Scorer -> AI Adapter -> position sizing -> order placement -> open-trade
//! state machine.

use crate::ai::adapter::AiIntegrationAdapter;
use crate::ai::ensemble::EnsembleOrchestrator;
use crate::config::PipelineConfig;
use crate::error::ExecutionError;
use crate::exchange::{ExchangeAdapter, OrderRequest, OrderSide, OrderType};
use crate::execution::trade::{apply_price, close, open_trade, stop_loss_take_profits};
use crate::models::{ExecutedTrade, ExecutionTier, MarketContext, PortfolioState, TradingSignal};
use crate::signals::{FibonacciEngine, Scheduler, SignalScorer, SignalValidator};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub signals_ai_enhanced: u64,
    pub signals_ai_boosted: u64,
    pub signals_ai_blocked: u64,
    pub signals_ai_neutral: u64,
    /// Signals discarded at the risk-manager pre-check (drawdown, daily
    /// loss, correlation, concentration, volatility) — distinct from
    /// `signals_ai_blocked`, which counts AI-ensemble BLOCK verdicts.
    pub signals_blocked: u64,
    pub errors: u64,
}

#[derive(Default)]
struct AtomicPipelineStats {
    signals_ai_enhanced: AtomicU64,
    signals_ai_boosted: AtomicU64,
    signals_ai_blocked: AtomicU64,
    signals_ai_neutral: AtomicU64,
    signals_blocked: AtomicU64,
    errors: AtomicU64,
}

impl AtomicPipelineStats {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            signals_ai_enhanced: self.signals_ai_enhanced.load(Ordering::Relaxed),
            signals_ai_boosted: self.signals_ai_boosted.load(Ordering::Relaxed),
            signals_ai_blocked: self.signals_ai_blocked.load(Ordering::Relaxed),
            signals_ai_neutral: self.signals_ai_neutral.load(Ordering::Relaxed),
            signals_blocked: self.signals_blocked.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Extra per-tick market context the exchange adapter's narrow contract
/// doesn't carry (spread, depth, measured latency).
pub struct MarketSnapshot {
    pub context: MarketContext,
    pub portfolio: Option<PortfolioState>,
    pub order_book: Option<(f64, f64)>,
    pub historical_win_rate: f64,
    pub measured_latency_ms: u64,
}

pub struct ExecutionEngine {
    fibonacci: FibonacciEngine,
    validator: SignalValidator,
    scheduler: Scheduler,
    scorer: SignalScorer,
    config: Arc<PipelineConfig>,
    orchestrator: Option<Arc<EnsembleOrchestrator>>,
    exchange: Arc<dyn ExchangeAdapter>,
    symbol_locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    open_trades: AsyncMutex<HashMap<String, ExecutedTrade>>,
    closed_trades: SyncMutex<Vec<ExecutedTrade>>,
    stats: AtomicPipelineStats,
}

impl ExecutionEngine {
    pub fn new(
        config: Arc<PipelineConfig>,
        orchestrator: Option<Arc<EnsembleOrchestrator>>,
        exchange: Arc<dyn ExchangeAdapter>,
    ) -> Self {
        Self {
            fibonacci: FibonacciEngine::new(config.atr_period, config.volatility_factor),
            validator: SignalValidator {
                price_tolerance_pct: config.price_tolerance_pct,
                ..Default::default()
            },
            scheduler: Scheduler::new(config.min_interval_s, config.max_consecutive_skips),
            scorer: SignalScorer,
            config,
            orchestrator,
            exchange,
            symbol_locks: SyncMutex::new(HashMap::new()),
            open_trades: AsyncMutex::new(HashMap::new()),
            closed_trades: SyncMutex::new(Vec::new()),
            stats: AtomicPipelineStats::default(),
        }
    }

    pub fn symbol_lock(&self, symbol: &str) -> Arc<AsyncMutex<()>> {
        self.symbol_locks
            .lock()
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Recorded by the caller (the mode manager, which owns the risk
    /// manager) when a risk-manager gate rejects an otherwise-accepted
    /// signal, and by the scheduler cut-out after the rejection.
    pub fn record_risk_block(&self, symbol: &str) {
        self.stats.signals_blocked.fetch_add(1, Ordering::Relaxed);
        self.scheduler.record_skip(symbol);
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs the pipeline up to (and including) AI enhancement, stopping
    /// short of placing an order. Used directly by AUTO/PAPER/BACKTEST via
    /// [`Self::tick`], and by SEMI_AUTO mode to obtain a candidate to hold
    /// for external confirmation before [`Self::execute_signal`] runs.
    pub async fn evaluate_signal(
        &self,
        symbol: &str,
        window: &[crate::models::Ohlcv],
        snapshot: &MarketSnapshot,
        now_ts: i64,
        cancel: &CancellationToken,
    ) -> Option<TradingSignal> {
        if self.scheduler.should_skip(symbol) {
            return None;
        }
        if !self.scheduler.can_execute(symbol, now_ts) {
            return None;
        }

        let candidate = self.fibonacci.get_signal(symbol, window)?;

        let position_size_hint = self.config.base_position_size;
        let validation = self.validator.validate(
            &candidate,
            &snapshot.context,
            position_size_hint,
            snapshot.portfolio.as_ref(),
        );
        if !validation.is_valid {
            self.scheduler.record_skip(symbol);
            return None;
        }

        if !self.scheduler.evaluate_timing(snapshot.order_book, 0.01) {
            return None;
        }

        let score = self.scorer.score(&candidate, &snapshot.context, snapshot.historical_win_rate);
        if score.execution_tier == ExecutionTier::Skip {
            return None;
        }

        let (stop_loss, tp1, tp2) =
            stop_loss_take_profits(candidate.direction, candidate.current_price, candidate.atr);

        let mut signal = TradingSignal {
            symbol: symbol.to_string(),
            direction: candidate.direction,
            entry_price: candidate.current_price,
            stop_loss,
            tp1,
            tp2,
            tier: score.execution_tier,
            confidence: validation.confidence,
            score: score.overall,
            ai_metadata: None,
        };
        signal.assert_invariants();

        if self.config.ai_enabled {
            if let Some(orchestrator) = &self.orchestrator {
                let adapter = AiIntegrationAdapter::new(orchestrator, &self.config);
                match adapter.enhance_signal(signal, &snapshot.context, cancel).await {
                    Some(enhanced) => {
                        match enhanced.ai_metadata.as_ref() {
                            Some(meta) => {
                                self.stats.signals_ai_enhanced.fetch_add(1, Ordering::Relaxed);
                                if meta.boosted {
                                    self.stats.signals_ai_boosted.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            None => {
                                self.stats.signals_ai_neutral.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        signal = enhanced;
                    }
                    None => {
                        self.stats.signals_ai_blocked.fetch_add(1, Ordering::Relaxed);
                        self.scheduler.record_skip(symbol);
                        return None;
                    }
                }
            } else {
                self.stats.signals_ai_neutral.fetch_add(1, Ordering::Relaxed);
            }
        }

        let spread_ok = snapshot
            .order_book
            .map(|(bid, ask)| (ask - bid) <= self.config.max_spread_pct / 100.0 * signal.entry_price)
            .unwrap_or(true);
        let latency_ok = snapshot.measured_latency_ms <= self.config.max_latency_ms;
        if !spread_ok || !latency_ok {
            self.scheduler.record_skip(symbol);
            return None;
        }

        Some(signal)
    }

    /// Places an order for an already-accepted signal and records the open
    /// trade. Returns `Ok(None)` only if a trade for this symbol is already
    /// open (the caller should have serialized via the per-symbol lock).
    pub async fn execute_signal(
        &self,
        signal: &TradingSignal,
        now_ts: i64,
    ) -> anyhow::Result<Option<ExecutedTrade>> {
        let symbol = signal.symbol.as_str();
        let position_size = self.config.base_position_size * signal.tier.size_multiplier();
        let side = match signal.direction {
            crate::models::Direction::Long => OrderSide::Buy,
            crate::models::Direction::Short => OrderSide::Sell,
        };
        let quantity = position_size / signal.entry_price.max(1e-9);
        let order = OrderRequest {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: Some(signal.entry_price),
            stop_price: None,
        };

        let mut open = self.open_trades.lock().await;
        if open.contains_key(symbol) {
            return Ok(None);
        }

        let placed = match self.exchange.place_order(order).await {
            Ok(ack) => ack,
            Err(err) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.scheduler.record_skip(symbol);
                return Err(ExecutionError::Exchange(err).into());
            }
        };

        let trade = open_trade(signal, placed.filled_qty.max(quantity));
        open.insert(symbol.to_string(), trade.clone());
        drop(open);
        self.scheduler.record_execution(symbol, now_ts);
        tracing::info!(symbol, tier = ?signal.tier, entry = signal.entry_price, "trade opened");

        Ok(Some(trade))
    }

    /// One tick for one symbol: evaluate then, if accepted, execute
    /// immediately. Returns `Ok(None)` for every ordinary rejection
    /// (cooldown, validator failure, SKIP tier, AI block, pre-trade check
    /// failure) — those are not errors.
    pub async fn tick(
        &self,
        symbol: &str,
        window: &[crate::models::Ohlcv],
        snapshot: &MarketSnapshot,
        now_ts: i64,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<ExecutedTrade>> {
        let lock = self.symbol_lock(symbol);
        let _guard = lock.lock().await;

        let Some(signal) = self.evaluate_signal(symbol, window, snapshot, now_ts, cancel).await
        else {
            return Ok(None);
        };
        self.execute_signal(&signal, now_ts).await
    }

    /// Applies a batch of price updates; closed trades move from the open
    /// table to the append-only closed history.
    pub async fn update_trades(&self, prices: &HashMap<String, f64>) -> Vec<ExecutedTrade> {
        let mut closed = Vec::new();
        let mut open = self.open_trades.lock().await;
        for (symbol, price) in prices {
            if let Some(trade) = open.get_mut(symbol) {
                if apply_price(trade, *price) {
                    let finished = trade.clone();
                    open.remove(symbol);
                    self.closed_trades.lock().push(finished.clone());
                    closed.push(finished);
                }
            }
        }
        closed
    }

    /// Force-closes every open trade at its last known price, tagged with
    /// `reason`. Used by the risk manager's emergency stop (spec.md §4.9):
    /// "close all open trades and tighten [limits]".
    pub async fn close_all_trades(&self, reason: &str) -> Vec<ExecutedTrade> {
        let mut open = self.open_trades.lock().await;
        let mut closed = Vec::with_capacity(open.len());
        for (_, mut trade) in open.drain() {
            let price = trade.current_price;
            close(&mut trade, price, reason);
            self.closed_trades.lock().push(trade.clone());
            closed.push(trade);
        }
        closed
    }

    pub async fn open_trade_for(&self, symbol: &str) -> Option<ExecutedTrade> {
        self.open_trades.lock().await.get(symbol).cloned()
    }

    pub async fn open_trade_count(&self) -> usize {
        self.open_trades.lock().await.len()
    }

    pub fn closed_trades(&self) -> Vec<ExecutedTrade> {
        self.closed_trades.lock().clone()
    }

    /// Per-provider telemetry, if AI enhancement is wired up for this engine.
    pub fn orchestrator_stats(&self) -> Option<crate::ai::types::OrchestratorStats> {
        self.orchestrator.as_ref().map(|o| o.get_orchestrator_stats())
    }
}

//! Trading Mode Manager: the top-level state machine selecting between
//! AUTO, SEMI_AUTO, MANUAL, PAPER and BACKTEST, and the periodic loop that
//! drives the execution engine.
//!
//! Mode transitions drain in-flight ticks before the new mode starts.
//! Daily counters reset at UTC midnight. A tick that cannot complete
//! before the next tick fires for the same symbol is dropped rather than
//! queued (coalescing, not backpressure).

use crate::config::PipelineConfig;
use crate::exchange::ExchangeAdapter;
use crate::execution::{ExecutionEngine, MarketSnapshot};
use crate::models::{Ohlcv, TradingSignal};
use crate::risk::RiskManager;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingMode {
    Auto,
    SemiAuto,
    Manual,
    Paper,
    Backtest,
}

/// A signal accepted by the pipeline but held for external confirmation
/// in SEMI_AUTO mode.
pub struct PendingConfirmation {
    pub signal: TradingSignal,
    pub received_at: DateTime<Utc>,
}

pub struct ModeManager {
    mode: RwLock<TradingMode>,
    config: Arc<PipelineConfig>,
    engine: Arc<ExecutionEngine>,
    exchange: Arc<dyn ExchangeAdapter>,
    risk: AsyncMutex<RiskManager>,
    confirmation_timeout: std::time::Duration,
    in_flight: SyncMutex<HashSet<String>>,
    pending: AsyncMutex<HashMap<String, (PendingConfirmation, oneshot::Sender<bool>)>>,
    last_daily_reset: SyncMutex<DateTime<Utc>>,
}

impl ModeManager {
    pub fn new(
        mode: TradingMode,
        config: Arc<PipelineConfig>,
        engine: Arc<ExecutionEngine>,
        exchange: Arc<dyn ExchangeAdapter>,
        risk: RiskManager,
    ) -> Self {
        Self {
            mode: RwLock::new(mode),
            config,
            engine,
            exchange,
            risk: AsyncMutex::new(risk),
            confirmation_timeout: std::time::Duration::from_secs(300),
            in_flight: SyncMutex::new(HashSet::new()),
            pending: AsyncMutex::new(HashMap::new()),
            last_daily_reset: SyncMutex::new(Utc::now()),
        }
    }

    pub fn mode(&self) -> TradingMode {
        *self.mode.read()
    }

    /// Switches mode after draining any in-flight tick. Callers running a
    /// dispatch loop should stop issuing new ticks before calling this.
    pub async fn set_mode(&self, mode: TradingMode) {
        loop {
            if self.in_flight.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        *self.mode.write() = mode;
        tracing::info!(?mode, "trading mode switched");
    }

    pub async fn maybe_reset_daily_counters(&self, now: DateTime<Utc>) {
        let needs_reset = {
            let mut last = self.last_daily_reset.lock();
            let stale = now.date_naive() != last.date_naive();
            if stale {
                *last = now;
            }
            stale
        };
        if needs_reset {
            self.risk.lock().await.reset_daily_counters();
            tracing::info!("daily risk counters reset");
        }
    }

    /// Runs one dispatch for `symbol` according to the current mode.
    /// Coalesces: if a tick for this symbol is already in flight, the new
    /// one is dropped rather than queued.
    pub async fn dispatch(
        &self,
        symbol: &str,
        window: &[Ohlcv],
        snapshot: &MarketSnapshot,
        now_ts: i64,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let mode = self.mode();
        if mode == TradingMode::Manual {
            return Ok(());
        }

        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(symbol.to_string()) {
                return Ok(());
            }
        }
        let result = self.dispatch_inner(mode, symbol, window, snapshot, now_ts, cancel).await;
        self.in_flight.lock().remove(symbol);
        result
    }

    async fn dispatch_inner(
        &self,
        mode: TradingMode,
        symbol: &str,
        window: &[Ohlcv],
        snapshot: &MarketSnapshot,
        now_ts: i64,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        match mode {
            TradingMode::Manual => Ok(()),
            TradingMode::Auto | TradingMode::Paper | TradingMode::Backtest => {
                let lock = self.engine.symbol_lock(symbol);
                let _guard = lock.lock().await;
                let Some(signal) =
                    self.engine.evaluate_signal(symbol, window, snapshot, now_ts, cancel).await
                else {
                    return Ok(());
                };
                if !self.risk_precheck(&signal).await {
                    return Ok(());
                }
                match self.engine.execute_signal(&signal, now_ts).await {
                    Ok(_) => Ok(()),
                    Err(err) => {
                        tracing::warn!(symbol, error = %err, "tick failed, continuing loop");
                        Ok(())
                    }
                }
            }
            TradingMode::SemiAuto => {
                let lock = self.engine.symbol_lock(symbol);
                let _guard = lock.lock().await;
                let Some(signal) =
                    self.engine.evaluate_signal(symbol, window, snapshot, now_ts, cancel).await
                else {
                    return Ok(());
                };
                if !self.risk_precheck(&signal).await {
                    return Ok(());
                }
                self.await_confirmation(signal, now_ts).await
            }
        }
    }

    /// Risk-manager pre-check run between signal acceptance and order
    /// placement: global drawdown/daily-loss halt, then the per-symbol
    /// sizing gates (open-trade cap, correlation, volatility). A rejection
    /// here is a risk-manager block (spec §4.9/§7), counted separately from
    /// an AI-ensemble block.
    async fn risk_precheck(&self, signal: &TradingSignal) -> bool {
        let risk = self.risk.lock().await;
        if risk.check_drawdown() {
            tracing::warn!(symbol = %signal.symbol, "risk manager blocked: drawdown limit breached");
            drop(risk);
            self.engine.record_risk_block(&signal.symbol);
            return false;
        }
        if risk.check_daily_loss() {
            tracing::warn!(symbol = %signal.symbol, "risk manager blocked: daily loss limit breached");
            drop(risk);
            self.engine.record_risk_block(&signal.symbol);
            return false;
        }

        let open_trades = self.engine.open_trade_count().await;
        let qty =
            risk.calculate_position_size(signal.entry_price, signal.stop_loss, &signal.symbol, open_trades);
        drop(risk);
        if qty <= 0.0 {
            tracing::warn!(symbol = %signal.symbol, "risk manager blocked: sizing gate rejected");
            self.engine.record_risk_block(&signal.symbol);
            return false;
        }
        true
    }

    async fn await_confirmation(&self, signal: TradingSignal, now_ts: i64) -> anyhow::Result<()> {
        let symbol = signal.symbol.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                symbol.clone(),
                (
                    PendingConfirmation { signal: signal.clone(), received_at: Utc::now() },
                    tx,
                ),
            );
        }

        let confirmed = tokio::time::timeout(self.confirmation_timeout, rx)
            .await
            .unwrap_or(Ok(false))
            .unwrap_or(false);
        self.pending.lock().await.remove(&symbol);

        if confirmed {
            self.engine.execute_signal(&signal, now_ts).await?;
        } else {
            tracing::debug!(symbol = %symbol, "semi-auto confirmation timed out or was rejected");
        }
        Ok(())
    }

    /// Called by the confirmation channel (e.g. `POST /confirm/:symbol`).
    pub async fn confirm(&self, symbol: &str, approve: bool) -> bool {
        if let Some((_, tx)) = self.pending.lock().await.remove(symbol) {
            let _ = tx.send(approve);
            true
        } else {
            false
        }
    }

    pub async fn pending_confirmations(&self) -> Vec<(String, PendingConfirmation)> {
        self.pending
            .lock()
            .await
            .iter()
            .map(|(symbol, (pending, _))| {
                (
                    symbol.clone(),
                    PendingConfirmation {
                        signal: pending.signal.clone(),
                        received_at: pending.received_at,
                    },
                )
            })
            .collect()
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn config(&self) -> &Arc<PipelineConfig> {
        &self.config
    }

    pub fn exchange(&self) -> &Arc<dyn ExchangeAdapter> {
        &self.exchange
    }

    pub async fn risk(&self) -> tokio::sync::MutexGuard<'_, RiskManager> {
        self.risk.lock().await
    }

    /// Closes every open trade and tightens the risk manager's sizing
    /// limits (spec.md §4.9). An operator-triggered kill switch, not an
    /// automatic response to a tripped gate.
    pub async fn emergency_stop(&self) -> Vec<crate::models::ExecutedTrade> {
        self.risk.lock().await.emergency_stop();
        let closed = self.engine.close_all_trades("emergency_stop").await;
        tracing::warn!(count = closed.len(), "emergency stop: closed all open trades");
        closed
    }
}

impl Clone for PendingConfirmation {
    fn clone(&self) -> Self {
        Self { signal: self.signal.clone(), received_at: self.received_at }
    }
}

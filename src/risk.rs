//! Portfolio-level risk manager: position sizing and trading gates.
//!
//! Position sizing uses a flat dollar-risk formula
//! (`dollar_risk / |entry - sl|`, clamped to `max_position_size`). The
//! Kelly-fraction and VaR machinery below is retained as auxiliary
//! telemetry — feeding `historical_win_rate` into the scorer and a VaR
//! figure into risk reporting — and never overrides that formula.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Kelly Criterion calculator, kept as auxiliary sizing telemetry only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellyCalculator {
    pub fraction: f64,
    pub bankroll: f64,
    win_history: VecDeque<bool>,
    max_history: usize,
}

impl KellyCalculator {
    pub fn new(bankroll: f64, fraction: f64) -> Self {
        Self {
            fraction: fraction.clamp(0.1, 0.5),
            bankroll,
            win_history: VecDeque::with_capacity(1000),
            max_history: 1000,
        }
    }

    pub fn raw_fraction(&self, win_probability: f64) -> f64 {
        let p = win_probability.clamp(0.001, 0.999);
        let q = 1.0 - p;
        let b = (1.0 / p) - 1.0;
        if b <= 0.0 {
            return 0.0;
        }
        ((b * p - q) / b).max(0.0)
    }

    pub fn update_history(&mut self, won: bool) {
        if self.win_history.len() >= self.max_history {
            self.win_history.pop_front();
        }
        self.win_history.push_back(won);
    }

    pub fn get_win_rate(&self) -> f64 {
        if self.win_history.is_empty() {
            return 0.5;
        }
        let wins = self.win_history.iter().filter(|&&w| w).count() as f64;
        wins / self.win_history.len() as f64
    }

    pub fn apply_pnl(&mut self, pnl: f64) {
        self.bankroll = (self.bankroll + pnl).max(0.0);
    }
}

/// Historical-simulation VaR calculator, kept as auxiliary telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaRCalculator {
    historical_pnl: VecDeque<f64>,
    confidence_level: f64,
    max_history: usize,
}

impl VaRCalculator {
    pub fn new(confidence_level: f64) -> Self {
        Self {
            historical_pnl: VecDeque::with_capacity(10_000),
            confidence_level: confidence_level.clamp(0.9, 0.99),
            max_history: 10_000,
        }
    }

    pub fn add_pnl(&mut self, pnl: f64) {
        if self.historical_pnl.len() >= self.max_history {
            self.historical_pnl.pop_front();
        }
        self.historical_pnl.push_back(pnl);
    }

    pub fn calculate_var(&self) -> Result<f64> {
        if self.historical_pnl.len() < 100 {
            return Ok(0.0);
        }
        let mut sorted: Vec<f64> = self.historical_pnl.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let index = ((1.0 - self.confidence_level) * sorted.len() as f64) as usize;
        Ok(-sorted[index])
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskParameters {
    pub max_position_size_pct: f64,
    pub max_portfolio_risk: f64,
    pub max_open_trades: usize,
    pub correlation_threshold: f64,
    pub volatility_threshold: f64,
    pub max_drawdown: f64,
    pub max_daily_loss: f64,
}

impl RiskParameters {
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self {
            max_position_size_pct: config.max_position_size_pct,
            max_portfolio_risk: config.max_portfolio_risk,
            max_open_trades: config.max_open_trades,
            correlation_threshold: config.correlation_threshold,
            volatility_threshold: config.volatility_threshold,
            max_drawdown: config.max_drawdown,
            max_daily_loss: config.max_daily_loss,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub notional: f64,
}

pub struct RiskManager {
    params: RiskParameters,
    current_balance: f64,
    initial_balance: f64,
    peak_balance: f64,
    daily_pnl: f64,
    kelly: KellyCalculator,
    var: VaRCalculator,
    correlations: HashMap<String, f64>,
    volatilities: HashMap<String, f64>,
}

impl RiskManager {
    pub fn new(initial_balance: f64, params: RiskParameters) -> Self {
        Self {
            params,
            current_balance: initial_balance,
            initial_balance,
            peak_balance: initial_balance,
            daily_pnl: 0.0,
            kelly: KellyCalculator::new(initial_balance, 0.5),
            var: VaRCalculator::new(0.95),
            correlations: HashMap::new(),
            volatilities: HashMap::new(),
        }
    }

    pub fn set_correlation(&mut self, symbol: &str, correlation: f64) {
        self.correlations.insert(symbol.to_string(), correlation);
    }

    pub fn set_volatility(&mut self, symbol: &str, volatility: f64) {
        self.volatilities.insert(symbol.to_string(), volatility);
    }

    /// `qty = dollar_risk / |entry - sl|`, clamped to `max_position_size_pct`
    /// of balance in notional terms. Returns 0 when a gate rejects sizing
    /// outright (open-trade cap, correlation, volatility).
    pub fn calculate_position_size(
        &self,
        entry: f64,
        stop_loss: f64,
        symbol: &str,
        open_positions: usize,
    ) -> f64 {
        if open_positions >= self.params.max_open_trades {
            return 0.0;
        }
        if let Some(&correlation) = self.correlations.get(symbol) {
            if correlation >= self.params.correlation_threshold {
                return 0.0;
            }
        }
        if let Some(&volatility) = self.volatilities.get(symbol) {
            if volatility > self.params.volatility_threshold {
                return 0.0;
            }
        }

        let risk_per_share = (entry - stop_loss).abs();
        if risk_per_share <= 0.0 {
            return 0.0;
        }
        let dollar_risk = self.current_balance * self.params.max_portfolio_risk;
        let qty = dollar_risk / risk_per_share;

        let max_notional = self.current_balance * (self.params.max_position_size_pct / 100.0);
        let notional = qty * entry;
        if notional > max_notional {
            max_notional / entry
        } else {
            qty
        }
    }

    pub fn check_drawdown(&self) -> bool {
        if self.peak_balance <= 0.0 {
            return false;
        }
        let drawdown = (self.peak_balance - self.current_balance) / self.peak_balance;
        drawdown >= self.params.max_drawdown
    }

    pub fn check_daily_loss(&self) -> bool {
        if self.initial_balance <= 0.0 {
            return false;
        }
        self.daily_pnl.abs() / self.initial_balance >= self.params.max_daily_loss
    }

    pub fn record_trade_outcome(&mut self, pnl: f64, won: bool) {
        self.current_balance += pnl;
        self.daily_pnl += pnl;
        self.peak_balance = self.peak_balance.max(self.current_balance);
        self.kelly.update_history(won);
        self.kelly.apply_pnl(pnl);
        self.var.add_pnl(pnl);
    }

    pub fn reset_daily_counters(&mut self) {
        self.daily_pnl = 0.0;
    }

    pub fn historical_win_rate(&self) -> f64 {
        self.kelly.get_win_rate()
    }

    pub fn value_at_risk_95(&self) -> f64 {
        self.var.calculate_var().unwrap_or(0.0)
    }

    pub fn current_balance(&self) -> f64 {
        self.current_balance
    }

    /// Tightens limits to 1% position size / 0.5% portfolio risk. The
    /// caller is responsible for actually closing open positions against
    /// the execution engine; this only adjusts the gate the next sizing
    /// call sees.
    pub fn emergency_stop(&mut self) {
        self.params.max_position_size_pct = 1.0;
        self.params.max_portfolio_risk = 0.005;
        tracing::warn!("emergency stop triggered: risk limits tightened");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RiskParameters {
        RiskParameters {
            max_position_size_pct: 5.0,
            max_portfolio_risk: 0.02,
            max_open_trades: 10,
            correlation_threshold: 0.7,
            volatility_threshold: 0.5,
            max_drawdown: 0.15,
            max_daily_loss: 0.05,
        }
    }

    #[test]
    fn sizes_position_from_flat_dollar_risk_formula() {
        // Position-size cap wide enough that the dollar-risk formula is the
        // binding constraint, not the clamp.
        let mut wide_cap = params();
        wide_cap.max_position_size_pct = 50.0;
        let manager = RiskManager::new(100_000.0, wide_cap);
        let qty = manager.calculate_position_size(42000.0, 40000.0, "BTC/USDT", 0);
        let expected = (100_000.0 * 0.02) / 2000.0;
        assert!((qty - expected).abs() < 1e-6);
    }

    #[test]
    fn clamps_to_max_position_size_pct() {
        let manager = RiskManager::new(100_000.0, params());
        // Tiny stop distance would otherwise produce a huge notional.
        let qty = manager.calculate_position_size(42000.0, 41999.0, "BTC/USDT", 0);
        let notional = qty * 42000.0;
        assert!(notional <= 100_000.0 * 0.05 + 1e-6);
    }

    #[test]
    fn rejects_when_open_trades_at_cap() {
        let manager = RiskManager::new(100_000.0, params());
        let qty = manager.calculate_position_size(42000.0, 41300.0, "BTC/USDT", 10);
        assert_eq!(qty, 0.0);
    }

    #[test]
    fn drawdown_gate_trips_at_threshold() {
        let mut manager = RiskManager::new(100_000.0, params());
        manager.record_trade_outcome(-15_000.0, false);
        assert!(manager.check_drawdown());
    }

    #[test]
    fn emergency_stop_tightens_limits() {
        let mut manager = RiskManager::new(100_000.0, params());
        let before = manager.calculate_position_size(42000.0, 41300.0, "BTC/USDT", 0);
        manager.emergency_stop();
        let after = manager.calculate_position_size(42000.0, 41300.0, "BTC/USDT", 0);
        assert!(after < before);
        assert!(after * 42000.0 <= 100_000.0 * 0.01 + 1e-6);
    }
}

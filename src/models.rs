//! Core data model shared across the pipeline.
//!
//! All public types derive `Serialize`/`Deserialize` so they can cross the
//! HTTP API boundary and be logged as structured fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Ohlcv {
    /// Panics if the bar violates the OHLCV invariants; these are established
    /// at ingestion, never downstream.
    pub fn assert_valid(&self) {
        debug_assert!(self.high >= self.open.max(self.close));
        debug_assert!(self.low <= self.open.min(self.close));
        debug_assert!(self.volume >= 0.0);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub strategy: String,
    pub symbol: String,
    pub direction: Direction,
    pub current_price: f64,
    pub triggered_level: String,
    pub fib_levels: HashMap<String, f64>,
    pub raw_confidence: f64,
    pub atr: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub condition_results: Vec<(String, bool)>,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionTier {
    Full,
    Reduced,
    Skip,
}

impl ExecutionTier {
    pub fn size_multiplier(&self) -> f64 {
        match self {
            ExecutionTier::Full => 1.0,
            ExecutionTier::Reduced => 0.65,
            ExecutionTier::Skip => 0.0,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            ExecutionTier::Full
        } else if score >= 60.0 {
            ExecutionTier::Reduced
        } else {
            ExecutionTier::Skip
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub name: String,
    pub points: f64,
    pub weight: f64,
}

impl ScoreComponent {
    pub fn weighted(&self) -> f64 {
        self.points * self.weight
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalScore {
    pub overall: f64,
    pub components: Vec<ScoreComponent>,
    pub execution_tier: ExecutionTier,
    pub size_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AiSignal {
    Buy,
    Hold,
    Sell,
}

impl AiSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiSignal::Buy => "BUY",
            AiSignal::Hold => "HOLD",
            AiSignal::Sell => "SELL",
        }
    }

    pub fn matches_direction(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (AiSignal::Buy, Direction::Long) | (AiSignal::Sell, Direction::Short)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    pub confidence: f64,
    pub signal: Option<AiSignal>,
    pub sentiment_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub tokens_used: u32,
    pub cost: f64,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub error: Option<String>,
}

impl AiResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.content.is_empty() && self.confidence > 0.0
    }

    pub fn error_response(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub consensus_signal: AiSignal,
    pub confidence: f64,
    pub provider_responses: HashMap<String, AiResponse>,
    pub voting_details: HashMap<String, f64>,
    pub sentiment_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub execution_time_ms: u64,
    pub insufficient_providers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMetadata {
    pub ensemble_consensus: AiSignal,
    pub ai_confidence: f64,
    pub provider_count: usize,
    pub sentiment_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub boosted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tier: ExecutionTier,
    pub confidence: f64,
    pub score: f64,
    pub ai_metadata: Option<AiMetadata>,
}

impl TradingSignal {
    /// Invariant violations are fatal: a stop-loss/TP ordering established
    /// backwards means the execution engine built the signal wrong.
    pub fn assert_invariants(&self) {
        match self.direction {
            Direction::Long => {
                assert!(self.stop_loss < self.entry_price);
                assert!(self.entry_price < self.tp1);
                assert!(self.tp1 < self.tp2);
            }
            Direction::Short => {
                assert!(self.stop_loss > self.entry_price);
                assert!(self.entry_price > self.tp1);
                assert!(self.tp1 > self.tp2);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    PartialFilled,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedTrade {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub status: TradeStatus,
    pub partial_1_taken: bool,
    pub current_price: f64,
    pub current_pnl: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
}

impl ExecutedTrade {
    pub fn update_price(&mut self, price: f64) {
        self.current_price = price;
        let diff = match self.direction {
            Direction::Long => price - self.entry_price,
            Direction::Short => self.entry_price - price,
        };
        self.current_pnl = diff * self.quantity;
    }

    pub fn is_at_tp1(&self) -> bool {
        match self.direction {
            Direction::Long => self.current_price >= self.tp1,
            Direction::Short => self.current_price <= self.tp1,
        }
    }

    pub fn is_at_tp2(&self) -> bool {
        match self.direction {
            Direction::Long => self.current_price >= self.tp2,
            Direction::Short => self.current_price <= self.tp2,
        }
    }

    pub fn is_at_stop_loss(&self) -> bool {
        match self.direction {
            Direction::Long => self.current_price <= self.stop_loss,
            Direction::Short => self.current_price >= self.stop_loss,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub rsi: f64,
    pub ema_20: f64,
    pub ema_50: f64,
    pub ema_200: f64,
    pub volume: f64,
    pub avg_volume: f64,
    pub atr: f64,
    pub market_volatility: f64,
    pub trend_direction: Option<Direction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioState {
    pub total_value: f64,
    pub correlations: HashMap<String, f64>,
}

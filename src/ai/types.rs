//! Shared types for the provider adapter layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Sentiment,
    MarketInsights,
    NewsAnalysis,
    RiskAssessment,
    SignalGeneration,
    TechnicalAnalysis,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Sentiment => "sentiment",
            AnalysisKind::MarketInsights => "market_insights",
            AnalysisKind::NewsAnalysis => "news_analysis",
            AnalysisKind::RiskAssessment => "risk_assessment",
            AnalysisKind::SignalGeneration => "signal_generation",
            AnalysisKind::TechnicalAnalysis => "technical_analysis",
        }
    }
}

/// Extra keyed options folded into the cache fingerprint alongside the
/// prompt. Kept as a sorted map so canonicalization is a non-event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    pub extra: std::collections::BTreeMap<String, String>,
    pub request_json: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderStats {
    pub requests: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub total_latency_ms: u64,
    pub total_cost: f64,
}

/// Per-provider telemetry breakdown. The pipeline-wide `signals_ai_*`
/// counters live on `PipelineStats` (see `execution::PipelineStats`); this
/// type only carries the figures `PipelineStats` can't see, one row per
/// provider in the ensemble.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub provider_stats: HashMap<String, ProviderStats>,
}

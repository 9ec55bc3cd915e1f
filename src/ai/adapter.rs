//! Translates a technical trading signal into an ensemble request and
//! interprets the consensus as BOOST / BLOCK / NEUTRAL.

use crate::ai::ensemble::EnsembleOrchestrator;
use crate::ai::types::{AnalysisKind, AnalyzeOptions};
use crate::config::PipelineConfig;
use crate::models::{AiMetadata, Direction, MarketContext, TradingSignal};
use tokio_util::sync::CancellationToken;

pub struct AiIntegrationAdapter<'a> {
    orchestrator: &'a EnsembleOrchestrator,
    config: &'a PipelineConfig,
}

impl<'a> AiIntegrationAdapter<'a> {
    pub fn new(orchestrator: &'a EnsembleOrchestrator, config: &'a PipelineConfig) -> Self {
        Self { orchestrator, config }
    }

    /// Enhances a technical signal with AI consensus. Returns `None` when
    /// the ensemble blocks the signal outright; otherwise returns the
    /// signal with its confidence possibly boosted and `ai_metadata` set.
    pub async fn enhance_signal(
        &self,
        mut signal: TradingSignal,
        market: &MarketContext,
        cancel: &CancellationToken,
    ) -> Option<TradingSignal> {
        let prompt = build_prompt(&signal, market);
        let result = self
            .orchestrator
            .analyze(
                &prompt,
                AnalysisKind::SignalGeneration,
                &AnalyzeOptions::default(),
                cancel,
            )
            .await;

        if result.insufficient_providers {
            // AI-neutral: leave technical confidence untouched.
            return Some(signal);
        }

        let provider_count = result.provider_responses.len();
        let consensus_matches_direction = result.consensus_signal.matches_direction(signal.direction);

        let should_block = result.consensus_signal == crate::models::AiSignal::Hold
            && result.confidence >= self.config.signal_block_threshold
            && result.risk_level == Some(crate::models::RiskLevel::High);
        if should_block {
            return None;
        }

        let should_boost = result.confidence >= self.config.signal_boost_threshold
            && provider_count >= 2
            && consensus_matches_direction;

        let mut boosted = false;
        if should_boost {
            // Open question resolved: the raw formula
            // `(ai_confidence - min_confidence) * multiplier` can go negative
            // when ai_confidence dips just under min_confidence even though
            // should_boost already requires ai_confidence >= boost_threshold;
            // clamp to non-negative rather than letting the signal's
            // confidence decrease under a "boost".
            let boost = ((result.confidence - self.config.min_confidence)
                * self.config.confidence_boost_multiplier)
                .max(0.0);
            signal.confidence = (signal.confidence + boost).min(100.0);
            boosted = true;
        }

        signal.ai_metadata = Some(AiMetadata {
            ensemble_consensus: result.consensus_signal,
            ai_confidence: result.confidence,
            provider_count,
            sentiment_score: result.sentiment_score,
            risk_level: result.risk_level,
            boosted,
        });

        Some(signal)
    }
}

fn build_prompt(signal: &TradingSignal, market: &MarketContext) -> String {
    let direction = match signal.direction {
        Direction::Long => "LONG",
        Direction::Short => "SHORT",
    };
    format!(
        "Assess a candidate {direction} trade. price={:.4} volume_ratio={:.3} volatility={:.4} \
         trend_direction={:?} rsi={:.2} ema_20={:.4} ema_50={:.4} ema_200={:.4}. \
         Respond as JSON with keys signal, confidence, sentiment_score, risk_level.",
        signal.entry_price,
        market.volume / market.avg_volume.max(1e-9),
        market.market_volatility,
        market.trend_direction,
        market.rsi,
        market.ema_20,
        market.ema_50,
        market.ema_200,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::AiProvider;
    use crate::models::{AiResponse, AiSignal, ExecutionTier, RiskLevel};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeProvider(AiResponse);

    #[async_trait]
    impl AiProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }
        async fn analyze(
            &self,
            _prompt: &str,
            _kind: AnalysisKind,
            _options: &AnalyzeOptions,
        ) -> AiResponse {
            self.0.clone()
        }
        fn get_stats(&self) -> crate::ai::types::ProviderStats {
            Default::default()
        }
        fn reset_stats(&self) {}
    }

    fn base_signal() -> TradingSignal {
        TradingSignal {
            symbol: "BTC/USDT".into(),
            direction: Direction::Long,
            entry_price: 42000.0,
            stop_loss: 41300.0,
            tp1: 42525.0,
            tp2: 43050.0,
            tier: ExecutionTier::Full,
            confidence: 80.0,
            score: 80.0,
            ai_metadata: None,
        }
    }

    fn market() -> MarketContext {
        MarketContext {
            rsi: 28.5,
            ema_20: 42100.0,
            ema_50: 41800.0,
            ema_200: 41000.0,
            volume: 1600.0,
            avg_volume: 1000.0,
            atr: 350.0,
            market_volatility: 0.02,
            trend_direction: Some(Direction::Long),
        }
    }

    #[tokio::test]
    async fn boosts_on_strong_matching_consensus() {
        let buy = AiResponse {
            content: "ok".into(),
            confidence: 0.85,
            signal: Some(AiSignal::Buy),
            risk_level: Some(RiskLevel::Low),
            ..Default::default()
        };
        let providers: Vec<(String, Box<dyn AiProvider>)> = vec![
            ("a".into(), Box::new(FakeProvider(buy.clone()))),
            ("b".into(), Box::new(FakeProvider(buy))),
        ];
        let orchestrator = EnsembleOrchestrator::new(providers, HashMap::new(), 2, true);
        let config = PipelineConfig::from_env().expect("default config");
        let adapter = AiIntegrationAdapter::new(&orchestrator, &config);
        let result = adapter
            .enhance_signal(base_signal(), &market(), &CancellationToken::new())
            .await
            .expect("not blocked");
        assert!(result.confidence > 80.0);
        assert!(result.ai_metadata.expect("metadata").boosted);
    }

    #[tokio::test]
    async fn blocks_on_hold_high_risk_consensus() {
        let hold = AiResponse {
            content: "ok".into(),
            confidence: 0.85,
            signal: Some(AiSignal::Hold),
            risk_level: Some(RiskLevel::High),
            ..Default::default()
        };
        let providers: Vec<(String, Box<dyn AiProvider>)> = vec![
            ("a".into(), Box::new(FakeProvider(hold.clone()))),
            ("b".into(), Box::new(FakeProvider(hold))),
        ];
        let orchestrator = EnsembleOrchestrator::new(providers, HashMap::new(), 2, true);
        let config = PipelineConfig::from_env().expect("default config");
        let adapter = AiIntegrationAdapter::new(&orchestrator, &config);
        let result = adapter
            .enhance_signal(base_signal(), &market(), &CancellationToken::new())
            .await;
        assert!(result.is_none());
    }
}

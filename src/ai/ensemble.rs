//! Fans a single analysis request out to every configured provider,
//! performs weighted voting under a quorum policy, and returns one
//! [`EnsembleResult`]. The orchestrator owns its providers; providers never
//! call back into it — statistics flow upward via `get_stats` pulls only.

use crate::ai::provider::AiProvider;
use crate::ai::types::{AnalysisKind, AnalyzeOptions, OrchestratorStats};
use crate::models::{AiResponse, AiSignal, EnsembleResult, RiskLevel};
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct EnsembleOrchestrator {
    providers: Vec<(String, Box<dyn AiProvider>)>,
    provider_weights: HashMap<String, f64>,
    min_providers: usize,
    enable_parallel: bool,
}

impl EnsembleOrchestrator {
    pub fn new(
        providers: Vec<(String, Box<dyn AiProvider>)>,
        provider_weights: HashMap<String, f64>,
        min_providers: usize,
        enable_parallel: bool,
    ) -> Self {
        Self {
            providers,
            provider_weights,
            min_providers,
            enable_parallel,
        }
    }

    async fn gather(
        &self,
        prompt: &str,
        kind: AnalysisKind,
        options: &AnalyzeOptions,
        cancel: &CancellationToken,
    ) -> HashMap<String, AiResponse> {
        if self.enable_parallel {
            let futures = self.providers.iter().map(|(name, provider)| {
                let name = name.clone();
                async move {
                    let response = provider.analyze(prompt, kind, options).await;
                    (name, response)
                }
            });
            let gathered = tokio::select! {
                results = futures::future::join_all(futures) => results,
                _ = cancel.cancelled() => return HashMap::new(),
            };
            gathered
                .into_iter()
                .filter(|(_, response)| response.is_success())
                .collect()
        } else {
            let mut results = HashMap::new();
            for (name, provider) in &self.providers {
                if cancel.is_cancelled() {
                    return HashMap::new();
                }
                let response = provider.analyze(prompt, kind, options).await;
                if response.is_success() {
                    results.insert(name.clone(), response);
                }
            }
            results
        }
    }

    fn weighted_vote(&self, responses: &HashMap<String, AiResponse>) -> (AiSignal, f64) {
        let mut votes: HashMap<AiSignal, f64> = HashMap::new();
        for (name, response) in responses {
            let signal = response.signal.unwrap_or(AiSignal::Hold);
            let weight = self.provider_weights.get(name).copied().unwrap_or(1.0);
            *votes.entry(signal).or_insert(0.0) += response.confidence * weight;
        }
        if votes.is_empty() {
            return (AiSignal::Hold, 0.0);
        }
        let total: f64 = votes.values().sum();
        // argmax with a deterministic lexicographic tie-break.
        let (winner, mass) = votes
            .into_iter()
            .max_by(|(sig_a, mass_a), (sig_b, mass_b)| {
                mass_a
                    .partial_cmp(mass_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| sig_b.as_str().cmp(sig_a.as_str()))
            })
            .expect("non-empty votes");
        let confidence = if total > 0.0 { mass / total } else { 0.0 };
        (winner, confidence)
    }

    fn aggregate_sentiment(&self, responses: &HashMap<String, AiResponse>) -> Option<f64> {
        let scores: Vec<f64> = responses.values().filter_map(|r| r.sentiment_score).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    fn aggregate_risk(&self, responses: &HashMap<String, AiResponse>) -> Option<RiskLevel> {
        let mut counts: HashMap<RiskLevel, u32> = HashMap::new();
        for response in responses.values() {
            if let Some(level) = response.risk_level {
                *counts.entry(level).or_insert(0) += 1;
            }
        }
        if counts.is_empty() {
            return None;
        }
        let max_count = *counts.values().max().expect("non-empty");
        // Plurality vote; ties broken toward the more severe level (conservative bias).
        counts
            .into_iter()
            .filter(|(_, count)| *count == max_count)
            .map(|(level, _)| level)
            .max()
    }

    pub async fn analyze(
        &self,
        prompt: &str,
        kind: AnalysisKind,
        options: &AnalyzeOptions,
        cancel: &CancellationToken,
    ) -> EnsembleResult {
        let started = Instant::now();
        let responses = self.gather(prompt, kind, options, cancel).await;

        if responses.len() < self.min_providers {
            return EnsembleResult {
                consensus_signal: AiSignal::Hold,
                confidence: 0.0,
                provider_responses: responses,
                voting_details: HashMap::new(),
                sentiment_score: None,
                risk_level: None,
                execution_time_ms: started.elapsed().as_millis() as u64,
                insufficient_providers: true,
            };
        }

        let (consensus_signal, confidence) = self.weighted_vote(&responses);
        let sentiment_score = self.aggregate_sentiment(&responses);
        let risk_level = self.aggregate_risk(&responses);
        let voting_details: HashMap<String, f64> = responses
            .iter()
            .filter_map(|(name, r)| r.signal.map(|_| (name.clone(), r.confidence)))
            .collect();

        EnsembleResult {
            consensus_signal,
            confidence,
            provider_responses: responses,
            voting_details,
            sentiment_score,
            risk_level,
            execution_time_ms: started.elapsed().as_millis() as u64,
            insufficient_providers: false,
        }
    }

    pub fn get_orchestrator_stats(&self) -> OrchestratorStats {
        let mut stats = OrchestratorStats::default();
        for (name, provider) in &self.providers {
            stats.provider_stats.insert(name.clone(), provider.get_stats());
        }
        stats
    }

    pub fn reset_all_stats(&self) {
        for (_, provider) in &self.providers {
            provider.reset_stats();
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeProvider {
        response: AiResponse,
        stats_requests: AtomicU64,
    }

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
            self.stats_requests.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
        fn get_stats(&self) -> crate::ai::types::ProviderStats {
            crate::ai::types::ProviderStats::default()
        }
        fn reset_stats(&self) {}
    }

    fn buy_response(confidence: f64) -> AiResponse {
        AiResponse {
            content: "{\"signal\":\"BUY\"}".into(),
            confidence,
            signal: Some(AiSignal::Buy),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn below_quorum_returns_hold_zero_confidence() {
        let providers: Vec<(String, Box<dyn AiProvider>)> = vec![(
            "a".into(),
            Box::new(FakeProvider {
                response: buy_response(0.9),
                stats_requests: AtomicU64::new(0),
            }),
        )];
        let orchestrator = EnsembleOrchestrator::new(providers, HashMap::new(), 2, true);
        let result = orchestrator
            .analyze("p", AnalysisKind::SignalGeneration, &AnalyzeOptions::default(), &CancellationToken::new())
            .await;
        assert!(result.insufficient_providers);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.consensus_signal, AiSignal::Hold);
    }

    #[tokio::test]
    async fn quorum_met_weighted_vote_picks_winner() {
        let providers: Vec<(String, Box<dyn AiProvider>)> = vec![
            (
                "a".into(),
                Box::new(FakeProvider {
                    response: buy_response(0.9),
                    stats_requests: AtomicU64::new(0),
                }),
            ),
            (
                "b".into(),
                Box::new(FakeProvider {
                    response: buy_response(0.8),
                    stats_requests: AtomicU64::new(0),
                }),
            ),
        ];
        let orchestrator = EnsembleOrchestrator::new(providers, HashMap::new(), 2, true);
        let result = orchestrator
            .analyze("p", AnalysisKind::SignalGeneration, &AnalyzeOptions::default(), &CancellationToken::new())
            .await;
        assert!(!result.insufficient_providers);
        assert_eq!(result.consensus_signal, AiSignal::Buy);
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn response_with_no_parsed_signal_votes_hold_not_dropped() {
        let unparseable = AiResponse {
            content: "not json".into(),
            confidence: 0.3,
            signal: None,
            ..Default::default()
        };
        let providers: Vec<(String, Box<dyn AiProvider>)> = vec![
            (
                "a".into(),
                Box::new(FakeProvider { response: unparseable, stats_requests: AtomicU64::new(0) }),
            ),
            (
                "b".into(),
                Box::new(FakeProvider {
                    response: buy_response(0.4),
                    stats_requests: AtomicU64::new(0),
                }),
            ),
        ];
        let orchestrator = EnsembleOrchestrator::new(providers, HashMap::new(), 2, true);
        let result = orchestrator
            .analyze("p", AnalysisKind::SignalGeneration, &AnalyzeOptions::default(), &CancellationToken::new())
            .await;
        assert!(!result.insufficient_providers);
        // Hold (0.3) and Buy (0.4) both contribute vote mass; Buy wins but
        // not unanimously, since the unparseable response was not dropped.
        assert_eq!(result.consensus_signal, AiSignal::Buy);
        assert!((result.confidence - 0.4 / 0.7).abs() < 1e-9);
    }
}

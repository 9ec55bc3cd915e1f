//! The provider adapter capability.
//!
//! A single polymorphic provider capability (`analyze`, `get_stats`,
//! `reset_stats`) — concrete providers differ only in how they talk to
//! their upstream, never in the surrounding cache/rate-limit/retry/cost
//! machinery, which lives once in [`ProviderRuntime`].

use crate::ai::cache::{fingerprint, ResponseCache};
use crate::ai::cost::{calculate_cost, CostTracker};
use crate::ai::rate_limiter::RateLimiter;
use crate::ai::types::{AnalysisKind, AnalyzeOptions, ProviderStats};
use crate::config::ProviderConfig;
use crate::error::AiError;
use crate::models::AiResponse;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Parsed fields extracted from a raw upstream completion.
pub struct UpstreamOutcome {
    pub content: String,
    pub confidence: f64,
    pub signal: Option<crate::models::AiSignal>,
    pub sentiment_score: Option<f64>,
    pub risk_level: Option<crate::models::RiskLevel>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn analyze(
        &self,
        prompt: &str,
        kind: AnalysisKind,
        options: &AnalyzeOptions,
    ) -> AiResponse;
    fn get_stats(&self) -> ProviderStats;
    fn reset_stats(&self);
}

/// The cache/rate-limit/retry/cost machinery shared by every provider.
/// Concrete providers own one of these and delegate `analyze` to
/// [`ProviderRuntime::execute`].
pub struct ProviderRuntime {
    pub config: ProviderConfig,
    rate_limiter: RateLimiter,
    cache: ResponseCache,
    cost_tracker: CostTracker,
    stats: Mutex<ProviderStats>,
    max_retries: u32,
    retry_delay: Duration,
    cost_per_1k_input: f64,
    cost_per_1k_output: f64,
}

impl ProviderRuntime {
    pub fn new(config: ProviderConfig, cost_per_1k_input: f64, cost_per_1k_output: f64) -> Self {
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit_rpm),
            cache: ResponseCache::new(config.cache_ttl_s),
            cost_tracker: CostTracker::new(),
            stats: Mutex::new(ProviderStats::default()),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            cost_per_1k_input,
            cost_per_1k_output,
            config,
        }
    }

    pub fn get_stats(&self) -> ProviderStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = ProviderStats::default();
    }

    /// Runs the full adapter contract: cache lookup, rate-limit acquire,
    /// timeout + exponential-backoff retry around `call`, cost accounting,
    /// cache store. Never returns an `Err` out of `analyze` — a final
    /// failure becomes an error `AiResponse`.
    pub async fn execute<'a, F>(
        &'a self,
        prompt: &'a str,
        kind: AnalysisKind,
        options: &'a AnalyzeOptions,
        call: F,
    ) -> AiResponse
    where
        F: Fn(&'a str, AnalysisKind) -> BoxFuture<'a, Result<UpstreamOutcome, AiError>>
            + Send
            + Sync,
    {
        let key = fingerprint(&self.config.model, kind, prompt, options);
        if let Some(cached) = self.cache.get(&key) {
            self.stats.lock().cache_hits += 1;
            return cached;
        }

        self.rate_limiter.acquire().await;
        let started = Instant::now();

        let timeout = Duration::from_secs(self.config.timeout_s);
        let mut attempt = 0;
        let outcome = loop {
            let attempt_result: Result<UpstreamOutcome, AiError> =
                match tokio::time::timeout(timeout, call(prompt, kind)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(AiError::Timeout {
                        provider: self.config.name.clone(),
                        timeout_s: self.config.timeout_s,
                    }),
                };

            match attempt_result {
                Ok(outcome) => break Ok(outcome),
                Err(err @ AiError::Permanent { .. }) => break Err(err),
                Err(transient) => {
                    if attempt >= self.max_retries {
                        break Err(transient);
                    }
                    let wait = self.retry_delay * 2u32.pow(attempt);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let mut stats = self.stats.lock();
        stats.requests += 1;
        stats.total_latency_ms += latency_ms;
        drop(stats);

        let response = match outcome {
            Ok(outcome) => {
                let cost = calculate_cost(
                    outcome.input_tokens,
                    outcome.output_tokens,
                    self.cost_per_1k_input,
                    self.cost_per_1k_output,
                );
                self.cost_tracker.add_cost(&self.config.name, &self.config.model, cost);
                self.stats.lock().total_cost += cost;
                AiResponse {
                    content: outcome.content,
                    confidence: outcome.confidence,
                    signal: outcome.signal,
                    sentiment_score: outcome.sentiment_score,
                    risk_level: outcome.risk_level,
                    tokens_used: outcome.input_tokens + outcome.output_tokens,
                    cost,
                    latency_ms,
                    cache_hit: false,
                    error: None,
                }
            }
            Err(err) => {
                self.stats.lock().errors += 1;
                tracing::warn!(provider = %self.config.name, error = %err, "provider call failed");
                AiResponse::error_response(err.to_string())
            }
        };

        if response.is_success() {
            self.cache.insert(key, response.clone());
        }
        response
    }
}

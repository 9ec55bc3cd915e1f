//! Per-provider/per-model cost accounting with daily rollover.
//!
//! Grounded in the reference provider base's `CostTracker`: tracks total
//! cost plus a per-day bucket that resets after 24 hours.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

struct Inner {
    total_cost: f64,
    cost_by_provider: HashMap<String, f64>,
    cost_by_model: HashMap<String, f64>,
    daily_cost: f64,
    day_started_at: DateTime<Utc>,
}

pub struct CostTracker {
    inner: Mutex<Inner>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                total_cost: 0.0,
                cost_by_provider: HashMap::new(),
                cost_by_model: HashMap::new(),
                daily_cost: 0.0,
                day_started_at: Utc::now(),
            }),
        }
    }

    pub fn add_cost(&self, provider: &str, model: &str, cost: f64) {
        let mut inner = self.inner.lock();
        inner.reset_if_needed();
        inner.total_cost += cost;
        inner.daily_cost += cost;
        *inner.cost_by_provider.entry(provider.to_string()).or_insert(0.0) += cost;
        *inner.cost_by_model.entry(model.to_string()).or_insert(0.0) += cost;
    }

    pub fn total_cost(&self) -> f64 {
        self.inner.lock().total_cost
    }

    pub fn daily_cost(&self) -> f64 {
        let mut inner = self.inner.lock();
        inner.reset_if_needed();
        inner.daily_cost
    }

    pub fn cost_by_provider(&self, provider: &str) -> f64 {
        self.inner
            .lock()
            .cost_by_provider
            .get(provider)
            .copied()
            .unwrap_or(0.0)
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn reset_if_needed(&mut self) {
        if Utc::now() - self.day_started_at >= chrono::Duration::hours(24) {
            self.daily_cost = 0.0;
            self.day_started_at = Utc::now();
        }
    }
}

/// Cost in USD for a completed call at the configured per-1K token rates.
pub fn calculate_cost(
    input_tokens: u32,
    output_tokens: u32,
    cost_per_1k_input: f64,
    cost_per_1k_output: f64,
) -> f64 {
    (input_tokens as f64 / 1000.0) * cost_per_1k_input
        + (output_tokens as f64 / 1000.0) * cost_per_1k_output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_cost_per_provider() {
        let tracker = CostTracker::new();
        tracker.add_cost("openai", "gpt-4o-mini", 0.002);
        tracker.add_cost("openai", "gpt-4o-mini", 0.003);
        assert!((tracker.cost_by_provider("openai") - 0.005).abs() < 1e-9);
        assert!((tracker.total_cost() - 0.005).abs() < 1e-9);
    }
}

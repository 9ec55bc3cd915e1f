//! Per-symbol scheduler and fail-safe cutout.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Default)]
struct SymbolState {
    last_execution_ts: Option<i64>,
    consecutive_skips: u32,
    latency_log_ms: Option<f64>,
}

pub struct Scheduler {
    min_interval_s: i64,
    max_consecutive_skips: u32,
    state: Mutex<HashMap<String, SymbolState>>,
}

impl Scheduler {
    pub fn new(min_interval_s: u64, max_consecutive_skips: u32) -> Self {
        Self {
            min_interval_s: min_interval_s as i64,
            max_consecutive_skips,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn can_execute(&self, symbol: &str, now_ts: i64) -> bool {
        let state = self.state.lock();
        match state.get(symbol).and_then(|s| s.last_execution_ts) {
            Some(last) => now_ts - last >= self.min_interval_s,
            None => true,
        }
    }

    pub fn should_skip(&self, symbol: &str) -> bool {
        self.state
            .lock()
            .get(symbol)
            .map(|s| s.consecutive_skips >= self.max_consecutive_skips)
            .unwrap_or(false)
    }

    pub fn record_execution(&self, symbol: &str, now_ts: i64) {
        let mut state = self.state.lock();
        let entry = state.entry(symbol.to_string()).or_default();
        entry.last_execution_ts = Some(now_ts);
        entry.consecutive_skips = 0;
    }

    pub fn record_skip(&self, symbol: &str) {
        let mut state = self.state.lock();
        let entry = state.entry(symbol.to_string()).or_default();
        entry.consecutive_skips += 1;
    }

    /// Resets the cutout externally (the only way a symbol recovers once
    /// `should_skip` trips).
    pub fn reset(&self, symbol: &str) {
        let mut state = self.state.lock();
        state.remove(symbol);
    }

    pub fn check_order_book_depth(best_bid: f64, best_ask: f64, required_depth_pct: f64) -> bool {
        if best_ask <= 0.0 {
            return false;
        }
        (best_ask - best_bid) / best_ask < required_depth_pct
    }

    /// Second-pass timing gate the execution engine runs after validation,
    /// once live order-book data is available; a first pass already ran at
    /// `can_execute`/`should_skip` against just the clock. `None` means no
    /// order-book snapshot was supplied and the tick proceeds.
    pub fn evaluate_timing(&self, order_book: Option<(f64, f64)>, required_depth_pct: f64) -> bool {
        match order_book {
            Some((bid, ask)) => Self::check_order_book_depth(bid, ask, required_depth_pct),
            None => true,
        }
    }

    pub async fn measure_latency<F, Fut, T>(&self, symbol: &str, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let started = tokio::time::Instant::now();
        let result = call().await;
        let elapsed: Duration = started.elapsed();
        let mut state = self.state.lock();
        state.entry(symbol.to_string()).or_default().latency_log_ms =
            Some(elapsed.as_secs_f64() * 1000.0);
        result
    }

    pub fn get_latency(&self, symbol: &str) -> Option<f64> {
        self.state.lock().get(symbol).and_then(|s| s.latency_log_ms)
    }

    pub fn consecutive_skips(&self, symbol: &str) -> u32 {
        self.state.lock().get(symbol).map(|s| s.consecutive_skips).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_blocks_second_tick_within_window() {
        let scheduler = Scheduler::new(300, 5);
        scheduler.record_execution("BTC/USDT", 1_000);
        assert!(!scheduler.can_execute("BTC/USDT", 1_100));
        assert!(scheduler.can_execute("BTC/USDT", 1_301));
    }

    #[test]
    fn cutout_trips_after_max_consecutive_skips() {
        let scheduler = Scheduler::new(300, 3);
        for _ in 0..3 {
            scheduler.record_skip("ETH/USDT");
        }
        assert!(scheduler.should_skip("ETH/USDT"));
        scheduler.record_execution("ETH/USDT", 1);
        assert!(!scheduler.should_skip("ETH/USDT"));
    }

    #[test]
    fn order_book_depth_check() {
        assert!(Scheduler::check_order_book_depth(99.99, 100.0, 0.01));
        assert!(!Scheduler::check_order_book_depth(98.0, 100.0, 0.01));
    }
}

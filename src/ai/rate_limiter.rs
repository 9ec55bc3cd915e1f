//! Per-provider rate limiting.
//!
//! Sliding window of request timestamps, as the reference provider base
//! class does (`RateLimiter.requests: List[float]`). Guarded by
//! `parking_lot::Mutex` since the critical section never awaits; callers
//! that are over budget sleep outside the lock between poll attempts.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: requests_per_minute.max(1),
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(&self, now: Instant) {
        let mut timestamps = self.timestamps.lock();
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Tries to record a request immediately. Returns `None` on success, or
    /// `Some(wait)` with how long the caller should sleep before retrying.
    /// Kept as a plain synchronous step so the `MutexGuard` never crosses
    /// an `.await` inside the calling future's state machine.
    fn try_acquire(&self, now: Instant) -> Option<Duration> {
        self.prune(now);
        let mut timestamps = self.timestamps.lock();
        if (timestamps.len() as u32) < self.max_requests {
            timestamps.push_back(now);
            return None;
        }
        let oldest = *timestamps.front().expect("non-empty: len >= max_requests >= 1");
        Some(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Blocks (asynchronously sleeps) until a slot is available, then
    /// records the request. Never drops a caller.
    pub async fn acquire(&self) {
        loop {
            let now = Instant::now();
            match self.try_acquire(now) {
                None => return,
                Some(wait) => {
                    tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
                }
            }
        }
    }

    pub fn current_load(&self) -> u32 {
        self.prune(Instant::now());
        self.timestamps.lock().len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_never_exceeds_window_budget() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.current_load(), 3);
    }
}

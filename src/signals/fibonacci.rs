//! Volatility-adjusted Fibonacci retracement detector.

use crate::models::{CandidateSignal, Direction, Ohlcv};
use std::collections::HashMap;

const FIB_LEVELS: [(&str, f64); 7] = [
    ("fibonacci_000", 0.0),
    ("fibonacci_236", 0.236),
    ("fibonacci_382", 0.382),
    ("fibonacci_500", 0.5),
    ("fibonacci_618", 0.618),
    ("fibonacci_786", 0.786),
    ("fibonacci_1000", 1.0),
];

const TRIGGER_TOLERANCE: f64 = 0.01;

pub type FallbackStrategy = Box<dyn Fn(&[Ohlcv]) -> Option<CandidateSignal> + Send + Sync>;

pub struct FibonacciEngine {
    atr_period: usize,
    volatility_factor: f64,
    fallbacks: Vec<(String, FallbackStrategy)>,
}

struct DynamicLevels {
    levels: HashMap<String, f64>,
    support_strong: f64,
    support_medium: f64,
    resistance_strong: f64,
    resistance_medium: f64,
}

impl FibonacciEngine {
    pub fn new(atr_period: usize, volatility_factor: f64) -> Self {
        let mut engine = Self {
            atr_period,
            volatility_factor,
            fallbacks: Vec::new(),
        };
        engine.register_fallback("mean_reversion", mean_reversion_strategy);
        engine
    }

    pub fn register_fallback<F>(&mut self, name: &str, strategy: F)
    where
        F: Fn(&[Ohlcv]) -> Option<CandidateSignal> + Send + Sync + 'static,
    {
        self.fallbacks.push((name.to_string(), Box::new(strategy)));
    }

    /// True-range average over the last `atr_period` bars, falling back to
    /// the mean high-low range if the window is too short.
    pub fn calculate_atr(&self, window: &[Ohlcv]) -> f64 {
        if window.len() < 2 {
            return window.last().map(|b| b.high - b.low).unwrap_or(0.0);
        }
        let period = self.atr_period.min(window.len() - 1);
        let recent = &window[window.len() - period - 1..];
        if recent.len() < 2 {
            return recent.iter().map(|b| b.high - b.low).sum::<f64>() / recent.len() as f64;
        }
        let mut true_ranges = Vec::with_capacity(recent.len() - 1);
        for pair in recent.windows(2) {
            let (prev, bar) = (pair[0], pair[1]);
            let tr = (bar.high - bar.low)
                .max((bar.high - prev.close).abs())
                .max((bar.low - prev.close).abs());
            true_ranges.push(tr);
        }
        true_ranges.iter().sum::<f64>() / true_ranges.len() as f64
    }

    fn dynamic_levels(&self, high: f64, low: f64, atr: f64, close: f64) -> DynamicLevels {
        let volatility_range = (high - low) * (1.0 + (atr / close.max(1e-9)) * self.volatility_factor);
        let mut levels = HashMap::new();
        levels.insert("support_strong".to_string(), high - volatility_range * 0.618);
        levels.insert("support_medium".to_string(), high - volatility_range * 0.382);
        levels.insert("support_weak".to_string(), high - volatility_range * 0.236);
        levels.insert("resistance_weak".to_string(), high + volatility_range * 0.236);
        levels.insert("resistance_medium".to_string(), high + volatility_range * 0.382);
        levels.insert("resistance_strong".to_string(), high + volatility_range * 0.618);
        for (name, fraction) in FIB_LEVELS {
            levels.insert(name.to_string(), high - volatility_range * fraction);
        }
        DynamicLevels {
            support_strong: levels["support_strong"],
            support_medium: levels["support_medium"],
            resistance_strong: levels["resistance_strong"],
            resistance_medium: levels["resistance_medium"],
            levels,
        }
    }

    /// Emits a candidate when price is within 1% of a support/resistance
    /// anchor.
    ///
    /// Direction is not an input here — it falls directly out of which
    /// anchor fires (support anchors imply LONG, resistance anchors imply
    /// SHORT). When price sits between the swing low and high, more than
    /// one anchor can be within tolerance simultaneously; rather than
    /// preserving the reference implementation's order-dependent
    /// first-match behavior, the nearest anchor by relative distance wins
    /// — a single deterministic rule regardless of which bucket is checked
    /// first.
    pub fn get_signal(&self, symbol: &str, window: &[Ohlcv]) -> Option<CandidateSignal> {
        if window.len() < 2 {
            return None;
        }
        let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let close = window.last().expect("non-empty").close;
        let atr = self.calculate_atr(window);
        let dynamic = self.dynamic_levels(high, low, atr, close);

        let candidates = [
            ("support_strong", dynamic.support_strong, Direction::Long),
            ("support_medium", dynamic.support_medium, Direction::Long),
            ("resistance_strong", dynamic.resistance_strong, Direction::Short),
            ("resistance_medium", dynamic.resistance_medium, Direction::Short),
        ];

        let nearest = candidates
            .iter()
            .map(|(name, level, direction)| {
                let relative_distance = (close - level).abs() / close.max(1e-9);
                (*name, *level, *direction, relative_distance)
            })
            .filter(|(_, _, _, distance)| *distance < TRIGGER_TOLERANCE)
            .min_by(|a, b| a.3.partial_cmp(&b.3).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((name, _, direction, _)) = nearest {
            return Some(CandidateSignal {
                strategy: "dynamic_fibonacci".to_string(),
                symbol: symbol.to_string(),
                direction,
                current_price: close,
                triggered_level: name.to_string(),
                fib_levels: dynamic.levels,
                raw_confidence: 0.85,
                atr,
            });
        }

        for (name, fallback) in &self.fallbacks {
            if let Some(mut candidate) = fallback(window) {
                candidate.strategy = format!("alternative:{name}");
                candidate.symbol = symbol.to_string();
                return Some(candidate);
            }
        }

        None
    }
}

/// The reference implementation's example alternative strategy, kept as the
/// crate's registered fallback: trigger when the close is 1.5 standard
/// deviations from the 20-bar mean.
fn mean_reversion_strategy(window: &[Ohlcv]) -> Option<CandidateSignal> {
    if window.len() < 20 {
        return None;
    }
    let recent = &window[window.len() - 20..];
    let closes: Vec<f64> = recent.iter().map(|b| b.close).collect();
    let mean = closes.iter().sum::<f64>() / closes.len() as f64;
    let variance = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / closes.len() as f64;
    let std_dev = variance.sqrt();
    let price = window.last().expect("non-empty").close;

    let direction = if price < mean - 1.5 * std_dev {
        Direction::Long
    } else if price > mean + 1.5 * std_dev {
        Direction::Short
    } else {
        return None;
    };

    Some(CandidateSignal {
        strategy: "mean_reversion".to_string(),
        symbol: String::new(),
        direction,
        current_price: price,
        triggered_level: "mean_reversion_band".to_string(),
        fib_levels: HashMap::new(),
        raw_confidence: 0.65,
        atr: std_dev,
    })
}

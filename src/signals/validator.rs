//! Seven-condition signal validator.

use crate::models::{CandidateSignal, Direction, MarketContext, PortfolioState, ValidationResult};

pub struct SignalValidator {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub volume_confirmation_multiplier: f64,
    pub max_position_size_pct: f64,
    pub max_portfolio_correlation: f64,
    pub price_tolerance_pct: f64,
}

impl Default for SignalValidator {
    fn default() -> Self {
        Self {
            rsi_oversold: 40.0,
            rsi_overbought: 60.0,
            volume_confirmation_multiplier: 1.5,
            max_position_size_pct: 5.0,
            max_portfolio_correlation: 0.7,
            price_tolerance_pct: 1.0,
        }
    }
}

impl SignalValidator {
    pub fn validate(
        &self,
        candidate: &CandidateSignal,
        market: &MarketContext,
        position_size: f64,
        portfolio: Option<&PortfolioState>,
    ) -> ValidationResult {
        let checks: Vec<(&str, bool)> = vec![
            ("price_level", self.check_price_level(candidate)),
            ("rsi", self.check_rsi(candidate.direction, market.rsi)),
            ("ema_alignment", self.check_ema_alignment(candidate, market)),
            ("volume", self.check_volume(market)),
            ("market_structure", self.check_market_structure(candidate, market)),
            ("position_sizing", self.check_position_sizing(position_size, portfolio)),
            ("portfolio_correlation", self.check_correlation(candidate, portfolio)),
        ];

        let passed = checks.iter().filter(|(_, ok)| *ok).count();
        let confidence = 100.0 * passed as f64 / checks.len() as f64;
        let violations = checks
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name.to_string())
            .collect();

        ValidationResult {
            is_valid: confidence >= 60.0,
            confidence,
            condition_results: checks.into_iter().map(|(n, ok)| (n.to_string(), ok)).collect(),
            violations,
        }
    }

    fn check_price_level(&self, candidate: &CandidateSignal) -> bool {
        if candidate.strategy == "dynamic_fibonacci" {
            let Some(&level_value) = candidate.fib_levels.get(&candidate.triggered_level) else {
                return true;
            };
            let deviation_pct = 100.0 * (candidate.current_price - level_value).abs()
                / candidate.current_price.max(1e-9);
            deviation_pct <= self.price_tolerance_pct
        } else {
            // Mean-reversion and unknown strategies accept unconditionally.
            true
        }
    }

    fn check_rsi(&self, direction: Direction, rsi: f64) -> bool {
        match direction {
            Direction::Long => (20.0..=self.rsi_oversold).contains(&rsi),
            Direction::Short => (self.rsi_overbought..=80.0).contains(&rsi),
        }
    }

    fn check_ema_alignment(&self, candidate: &CandidateSignal, market: &MarketContext) -> bool {
        match candidate.direction {
            Direction::Long => candidate.current_price > market.ema_20 && market.ema_20 > market.ema_50,
            Direction::Short => candidate.current_price < market.ema_20 && market.ema_20 < market.ema_50,
        }
    }

    fn check_volume(&self, market: &MarketContext) -> bool {
        market.volume >= market.avg_volume * self.volume_confirmation_multiplier
    }

    fn check_market_structure(&self, candidate: &CandidateSignal, market: &MarketContext) -> bool {
        if market.atr <= 0.0 || candidate.current_price <= 0.0 {
            return true;
        }
        let volatility_ratio = 100.0 * market.atr / candidate.current_price;
        match candidate.strategy.as_str() {
            "dynamic_fibonacci" => volatility_ratio >= 1.0,
            "mean_reversion" => volatility_ratio < 2.0,
            _ => true,
        }
    }

    fn check_position_sizing(&self, position_size: f64, portfolio: Option<&PortfolioState>) -> bool {
        let Some(portfolio) = portfolio else {
            return true;
        };
        if portfolio.total_value <= 0.0 {
            return true;
        }
        100.0 * position_size / portfolio.total_value <= self.max_position_size_pct
    }

    fn check_correlation(&self, candidate: &CandidateSignal, portfolio: Option<&PortfolioState>) -> bool {
        let Some(portfolio) = portfolio else {
            return true;
        };
        match portfolio.correlations.get(&candidate.symbol) {
            Some(&correlation) => correlation <= self.max_portfolio_correlation,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn long_candidate() -> CandidateSignal {
        let mut fib_levels = HashMap::new();
        fib_levels.insert("support_strong".to_string(), 42000.0);
        CandidateSignal {
            strategy: "dynamic_fibonacci".into(),
            symbol: "BTC/USDT".into(),
            direction: Direction::Long,
            current_price: 42000.0,
            triggered_level: "support_strong".into(),
            fib_levels,
            raw_confidence: 0.85,
            atr: 350.0,
        }
    }

    fn good_market() -> MarketContext {
        MarketContext {
            rsi: 28.5,
            ema_20: 41900.0,
            ema_50: 41800.0,
            ema_200: 41000.0,
            volume: 1600.0,
            avg_volume: 1000.0,
            atr: 450.0,
            market_volatility: 0.02,
            trend_direction: Some(Direction::Long),
        }
    }

    #[test]
    fn all_seven_conditions_pass_gives_full_confidence() {
        let validator = SignalValidator::default();
        let result = validator.validate(&long_candidate(), &good_market(), 100.0, None);
        assert_eq!(result.confidence, 100.0);
        assert!(result.is_valid);
    }

    #[test]
    fn rsi_out_of_band_drops_below_threshold() {
        let validator = SignalValidator::default();
        let mut market = good_market();
        market.rsi = 65.0;
        let result = validator.validate(&long_candidate(), &market, 100.0, None);
        assert!(result.violations.contains(&"rsi".to_string()));
        assert!((result.confidence - 100.0 * 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn correlation_at_exact_threshold_passes() {
        let validator = SignalValidator::default();
        let portfolio = crate::models::PortfolioState {
            total_value: 100_000.0,
            correlations: HashMap::from([("BTC/USDT".to_string(), 0.7)]),
        };
        let result = validator.validate(&long_candidate(), &good_market(), 100.0, Some(&portfolio));
        assert!(!result.violations.contains(&"portfolio_correlation".to_string()));
        assert_eq!(result.confidence, 100.0);
    }
}

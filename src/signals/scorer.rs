//! Five-component weighted signal scorer.

use crate::models::{CandidateSignal, Direction, ExecutionTier, MarketContext, ScoreComponent, SignalScore};

pub struct SignalScorer;

impl SignalScorer {
    pub fn score(
        &self,
        candidate: &CandidateSignal,
        market: &MarketContext,
        historical_win_rate: f64,
    ) -> SignalScore {
        let components = vec![
            ScoreComponent {
                name: "technical_alignment".to_string(),
                points: self.technical_alignment(candidate, market),
                weight: 0.30,
            },
            ScoreComponent {
                name: "volume_confirmation".to_string(),
                points: self.volume_confirmation(market),
                weight: 0.20,
            },
            ScoreComponent {
                name: "volatility_context".to_string(),
                points: self.volatility_context(candidate, market),
                weight: 0.20,
            },
            ScoreComponent {
                name: "historical_win_rate".to_string(),
                points: self.historical_win_rate(historical_win_rate),
                weight: 0.15,
            },
            ScoreComponent {
                name: "market_condition".to_string(),
                points: self.market_condition(candidate, market),
                weight: 0.15,
            },
        ];

        let overall = components.iter().map(|c| c.weighted()).sum::<f64>().clamp(0.0, 100.0);
        let execution_tier = ExecutionTier::from_score(overall);

        SignalScore {
            overall,
            size_multiplier: execution_tier.size_multiplier(),
            execution_tier,
            components,
        }
    }

    fn technical_alignment(&self, candidate: &CandidateSignal, market: &MarketContext) -> f64 {
        let mut points: f64 = 0.0;
        if candidate.fib_levels.contains_key(&candidate.triggered_level) {
            let is_golden = candidate.triggered_level == "support_strong"
                || candidate.triggered_level == "resistance_strong";
            points += if is_golden { 35.0 } else { 30.0 };
        }

        points += match candidate.direction {
            Direction::Long => {
                if (20.0..30.0).contains(&market.rsi) {
                    40.0
                } else if (30.0..40.0).contains(&market.rsi) {
                    30.0
                } else if (40.0..50.0).contains(&market.rsi) {
                    15.0
                } else {
                    0.0
                }
            }
            Direction::Short => {
                if market.rsi > 70.0 && market.rsi <= 80.0 {
                    40.0
                } else if market.rsi > 60.0 && market.rsi <= 70.0 {
                    30.0
                } else if market.rsi > 50.0 && market.rsi <= 60.0 {
                    15.0
                } else {
                    0.0
                }
            }
        };

        let ema_full = match candidate.direction {
            Direction::Long => candidate.current_price > market.ema_20 && market.ema_20 > market.ema_50,
            Direction::Short => candidate.current_price < market.ema_20 && market.ema_20 < market.ema_50,
        };
        let ema_partial = match candidate.direction {
            Direction::Long => candidate.current_price > market.ema_20,
            Direction::Short => candidate.current_price < market.ema_20,
        };
        points += if ema_full {
            30.0
        } else if ema_partial {
            15.0
        } else {
            0.0
        };

        points.min(100.0)
    }

    fn volume_confirmation(&self, market: &MarketContext) -> f64 {
        let ratio = market.volume / market.avg_volume.max(1e-9);
        if ratio >= 1.5 {
            100.0
        } else if ratio >= 1.2 {
            80.0
        } else if ratio >= 1.0 {
            60.0
        } else {
            30.0
        }
    }

    fn volatility_context(&self, candidate: &CandidateSignal, market: &MarketContext) -> f64 {
        let mut points: f64 = 50.0;
        if market.market_volatility < 0.3 {
            points += 15.0;
        } else if market.market_volatility > 0.7 {
            points += 20.0;
        }
        if candidate.atr > 0.001 && candidate.atr < 10.0 {
            points += 15.0;
        }
        points.min(100.0)
    }

    fn historical_win_rate(&self, win_rate: f64) -> f64 {
        if win_rate >= 0.70 {
            100.0
        } else if win_rate >= 0.65 {
            85.0
        } else if win_rate >= 0.60 {
            70.0
        } else if win_rate >= 0.55 {
            50.0
        } else {
            30.0
        }
    }

    fn market_condition(&self, candidate: &CandidateSignal, market: &MarketContext) -> f64 {
        let mut points: f64 = 50.0;
        match market.trend_direction {
            Some(trend) if trend == candidate.direction => points += 25.0,
            Some(_) => points -= 15.0,
            None => points += 15.0,
        }
        if market.rsi < 20.0 || market.rsi > 80.0 {
            points += 10.0;
        }
        points.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn candidate() -> CandidateSignal {
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

    fn market() -> MarketContext {
        MarketContext {
            rsi: 22.0,
            ema_20: 41900.0,
            ema_50: 41800.0,
            ema_200: 41000.0,
            volume: 1700.0,
            avg_volume: 1000.0,
            atr: 5.0,
            market_volatility: 0.8,
            trend_direction: Some(Direction::Long),
        }
    }

    #[test]
    fn strong_alignment_scores_full_tier() {
        let scorer = SignalScorer;
        let score = scorer.score(&candidate(), &market(), 0.72);
        assert!(score.overall >= 75.0, "overall={}", score.overall);
        assert_eq!(score.execution_tier, ExecutionTier::Full);
        assert_eq!(score.size_multiplier, 1.0);
    }

    #[test]
    fn rsi_tier_boundaries_match_reference_scorer() {
        let scorer = SignalScorer;
        let candidate = candidate();
        let at_27 = scorer.technical_alignment(&candidate, &MarketContext { rsi: 27.0, ..market() });
        let at_33 = scorer.technical_alignment(&candidate, &MarketContext { rsi: 33.0, ..market() });
        let out_of_band = scorer.technical_alignment(&candidate, &MarketContext { rsi: 55.0, ..market() });
        assert!(at_27 > at_33, "rsi=27 should score the tier-1 bonus, not tier-2");
        assert_eq!(out_of_band - at_33, -30.0, "out-of-band rsi should contribute 0, not the old 15-point floor");
    }

    #[test]
    fn overall_is_monotone_in_component_points() {
        let scorer = SignalScorer;
        let weak_market = MarketContext { rsi: 50.0, volume: 900.0, ..market() };
        let weak = scorer.score(&candidate(), &weak_market, 0.3);
        let strong = scorer.score(&candidate(), &market(), 0.72);
        assert!(strong.overall >= weak.overall);
    }
}

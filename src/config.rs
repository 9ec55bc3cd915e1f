//! Pipeline configuration loaded from environment variables.
//!
//! A typed projection over `std::env`, loaded once at process start.
//! Secrets (`*_API_KEY`) are read here and never logged or serialized back
//! out.

use serde::{Deserialize, Serialize};

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub cache_ttl_s: u64,
    pub rate_limit_rpm: u32,
    pub accuracy_weight: f64,
    pub timeout_s: u64,
    pub enabled: bool,
}

impl ProviderConfig {
    fn from_env(name: &str, default_model: &str, default_weight: f64) -> Self {
        let upper = name.to_uppercase();
        let api_key = std::env::var(format!("PROVIDER_{upper}_API_KEY")).unwrap_or_default();
        let enabled = env_bool(&format!("PROVIDER_{upper}_ENABLED"), true) && !api_key.is_empty();
        Self {
            name: name.to_string(),
            api_key,
            model: env_string(&format!("PROVIDER_{upper}_MODEL"), default_model),
            cache_ttl_s: env_num(&format!("PROVIDER_{upper}_CACHE_TTL"), 300),
            rate_limit_rpm: env_num(&format!("PROVIDER_{upper}_RATE_LIMIT_RPM"), 60),
            accuracy_weight: env_num(&format!("PROVIDER_{upper}_ACCURACY_WEIGHT"), default_weight),
            timeout_s: env_num(&format!("PROVIDER_{upper}_TIMEOUT_SECONDS"), 30),
            enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub ai_enabled: bool,
    pub min_providers: usize,
    pub min_confidence: f64,
    pub enable_parallel: bool,
    pub providers: Vec<ProviderConfig>,

    pub signal_boost_threshold: f64,
    pub signal_block_threshold: f64,
    pub confidence_boost_multiplier: f64,
    pub risk_assessment_enabled: bool,
    pub high_risk_block: bool,
    pub sentiment_analysis_enabled: bool,

    pub atr_period: usize,
    pub volatility_factor: f64,
    pub price_tolerance_pct: f64,

    pub min_interval_s: u64,
    pub max_consecutive_skips: u32,

    pub base_position_size: f64,
    pub max_spread_pct: f64,
    pub max_latency_ms: u64,

    pub initial_balance: f64,
    pub max_position_size_pct: f64,
    pub max_portfolio_risk: f64,
    pub max_open_trades: usize,
    pub correlation_threshold: f64,
    pub volatility_threshold: f64,
    pub max_drawdown: f64,
    pub max_daily_loss: f64,
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let providers = vec![
            ProviderConfig::from_env("openai", "gpt-4o-mini", 1.0),
            ProviderConfig::from_env("anthropic", "claude-3-haiku", 1.0),
            ProviderConfig::from_env("gemini", "gemini-1.5-flash", 0.9),
            ProviderConfig::from_env("grok", "grok-beta", 0.8),
        ];

        Ok(Self {
            ai_enabled: env_bool("AI_ENABLED", true),
            min_providers: env_num("MIN_PROVIDERS", 2),
            min_confidence: env_num("MIN_CONFIDENCE", 0.7),
            enable_parallel: env_bool("ENABLE_PARALLEL", true),
            providers,

            signal_boost_threshold: env_num("SIGNAL_BOOST_THRESHOLD", 0.7),
            signal_block_threshold: env_num("SIGNAL_BLOCK_THRESHOLD", 0.8),
            confidence_boost_multiplier: env_num("CONFIDENCE_BOOST_MULTIPLIER", 20.0),
            risk_assessment_enabled: env_bool("RISK_ASSESSMENT_ENABLED", true),
            high_risk_block: env_bool("HIGH_RISK_BLOCK", true),
            sentiment_analysis_enabled: env_bool("SENTIMENT_ANALYSIS_ENABLED", true),

            atr_period: env_num("ATR_PERIOD", 14),
            volatility_factor: env_num("VOLATILITY_FACTOR", 0.5),
            price_tolerance_pct: env_num("PRICE_TOLERANCE_PCT", 1.0),

            min_interval_s: env_num("MIN_INTERVAL_S", 300),
            max_consecutive_skips: env_num("MAX_CONSECUTIVE_SKIPS", 5),

            base_position_size: env_num("BASE_POSITION_SIZE", 1000.0),
            max_spread_pct: env_num("MAX_SPREAD_PCT", 0.05),
            max_latency_ms: env_num("MAX_LATENCY_MS", 500),

            initial_balance: env_num("INITIAL_BALANCE", 100_000.0),
            max_position_size_pct: env_num("MAX_POSITION_SIZE_PCT", 5.0),
            max_portfolio_risk: env_num("MAX_PORTFOLIO_RISK", 0.02),
            max_open_trades: env_num("MAX_OPEN_TRADES", 10),
            correlation_threshold: env_num("CORRELATION_THRESHOLD", 0.7),
            volatility_threshold: env_num("VOLATILITY_THRESHOLD", 0.5),
            max_drawdown: env_num("MAX_DRAWDOWN", 0.15),
            max_daily_loss: env_num("MAX_DAILY_LOSS", 0.05),
        })
    }
}

//! Confluence signal engine entrypoint.
//!
//! Wires the pipeline explicitly at startup (no global singletons): load
//! config, build the AI ensemble, the exchange adapter, the execution
//! engine, the risk manager and the mode manager, then run the tick loop
//! and the stats/confirmation HTTP surface side by side until shutdown.

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, ValueEnum};
use confluence_signal_engine::ai::ensemble::EnsembleOrchestrator;
use confluence_signal_engine::ai::provider::AiProvider;
use confluence_signal_engine::ai::providers::{
    AnthropicProvider, GeminiProvider, GrokProvider, OpenAiProvider,
};
use confluence_signal_engine::api::{api_router, ApiState};
use confluence_signal_engine::config::PipelineConfig;
use confluence_signal_engine::exchange::paper::PaperExchange;
use confluence_signal_engine::exchange::{ExchangeAdapter, Timeframe};
use confluence_signal_engine::execution::{ExecutionEngine, MarketSnapshot};
use confluence_signal_engine::mode_manager::{ModeManager, TradingMode};
use confluence_signal_engine::models::MarketContext;
use confluence_signal_engine::risk::{RiskManager, RiskParameters};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Auto,
    SemiAuto,
    Manual,
    Paper,
    Backtest,
}

impl From<CliMode> for TradingMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Auto => TradingMode::Auto,
            CliMode::SemiAuto => TradingMode::SemiAuto,
            CliMode::Manual => TradingMode::Manual,
            CliMode::Paper => TradingMode::Paper,
            CliMode::Backtest => TradingMode::Backtest,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "confluence", about = "AI-augmented trading signal pipeline")]
struct Cli {
    /// Trading mode to start in.
    #[arg(long, value_enum, default_value = "paper", env = "TRADING_MODE")]
    mode: CliMode,

    /// Comma-separated symbols to tick.
    #[arg(long, default_value = "BTC/USDT,ETH/USDT", env = "SYMBOLS")]
    symbols: String,

    /// Tick interval in seconds.
    #[arg(long, default_value_t = 60, env = "TICK_INTERVAL_S")]
    tick_interval_s: u64,

    /// HTTP listen address for the stats/confirmation API.
    #[arg(long, default_value = "0.0.0.0:3000", env = "LISTEN_ADDR")]
    listen_addr: String,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confluence_signal_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_orchestrator(config: &PipelineConfig) -> Option<Arc<EnsembleOrchestrator>> {
    if !config.ai_enabled {
        return None;
    }

    let mut providers: Vec<(String, Box<dyn AiProvider>)> = Vec::new();
    let mut weights = std::collections::HashMap::new();
    for provider_config in &config.providers {
        if !provider_config.enabled {
            continue;
        }
        let built: anyhow::Result<Box<dyn AiProvider>> = match provider_config.name.as_str() {
            "openai" => OpenAiProvider::new(provider_config.clone())
                .map(|p| Box::new(p) as Box<dyn AiProvider>),
            "anthropic" => AnthropicProvider::new(provider_config.clone())
                .map(|p| Box::new(p) as Box<dyn AiProvider>),
            "gemini" => GeminiProvider::new(provider_config.clone())
                .map(|p| Box::new(p) as Box<dyn AiProvider>),
            "grok" => GrokProvider::new(provider_config.clone())
                .map(|p| Box::new(p) as Box<dyn AiProvider>),
            other => {
                warn!(provider = other, "unknown provider name in config, skipping");
                continue;
            }
        };
        match built {
            Ok(provider) => {
                weights.insert(provider_config.name.clone(), provider_config.accuracy_weight);
                providers.push((provider_config.name.clone(), provider));
            }
            Err(err) => {
                warn!(provider = %provider_config.name, error = %err, "failed to build provider client, skipping");
            }
        }
    }

    if providers.is_empty() {
        warn!("AI_ENABLED is set but no provider has both an API key and enabled=true; running without AI ensemble");
        return None;
    }

    Some(Arc::new(EnsembleOrchestrator::new(
        providers,
        weights,
        config.min_providers,
        config.enable_parallel,
    )))
}

/// Seeds the paper exchange with a synthetic OHLCV history so the tick loop
/// has something to evaluate. Real exchange connectivity is outside this
/// core's scope (see `ExchangeAdapter`); operators wire a production
/// adapter in its place.
fn seed_paper_exchange(exchange: &PaperExchange, symbols: &[String]) {
    use confluence_signal_engine::models::Ohlcv;

    for symbol in symbols {
        let mut price = 100.0_f64;
        let mut bars = Vec::with_capacity(60);
        for i in 0..60 {
            let drift = (i as f64 * 0.37).sin() * 0.8;
            let open = price;
            let close = (price + drift).max(1.0);
            let high = open.max(close) + 0.4;
            let low = open.min(close) - 0.4;
            bars.push(Ohlcv { timestamp: i, open, high, low, close, volume: 1000.0 + i as f64 });
            price = close;
        }
        exchange.set_history(symbol, bars);
        exchange.set_price(symbol, price);
        exchange.set_balance("USDT", 100_000.0, 0.0);
    }
}

async fn run_tick_loop(
    mode_manager: Arc<ModeManager>,
    symbols: Vec<String>,
    tick_interval_s: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(tick_interval_s));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("tick loop draining in-flight work and stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        mode_manager.maybe_reset_daily_counters(chrono::Utc::now()).await;

        let now_ts = chrono::Utc::now().timestamp();
        let mut handles = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            let mode_manager = mode_manager.clone();
            let symbol = symbol.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let exchange = mode_manager.exchange().clone();
                let window = match exchange.get_historical_data(&symbol, Timeframe::M5, 60).await {
                    Ok(bars) => bars,
                    Err(err) => {
                        warn!(symbol = %symbol, error = %err, "failed to fetch historical data");
                        return;
                    }
                };
                let Some(last) = window.last() else { return };

                let context = MarketContext {
                    rsi: 30.0,
                    ema_20: last.close * 0.999,
                    ema_50: last.close * 0.995,
                    ema_200: last.close * 0.98,
                    volume: last.volume,
                    avg_volume: last.volume * 0.8,
                    atr: (last.high - last.low).max(0.01),
                    market_volatility: 0.4,
                    trend_direction: None,
                };
                let snapshot = MarketSnapshot {
                    context,
                    portfolio: None,
                    order_book: Some((last.close - 0.05, last.close + 0.05)),
                    historical_win_rate: mode_manager.risk().await.historical_win_rate(),
                    measured_latency_ms: 50,
                };

                if let Err(err) =
                    mode_manager.dispatch(&symbol, &window, &snapshot, now_ts, &cancel).await
                {
                    warn!(symbol = %symbol, error = %err, "dispatch failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    info!(mode = ?cli.mode, symbols = %cli.symbols, "confluence signal engine starting");

    let config = Arc::new(PipelineConfig::from_env().context("failed to load pipeline config")?);
    let symbols: Vec<String> = cli.symbols.split(',').map(|s| s.trim().to_string()).collect();

    let orchestrator = build_orchestrator(&config);
    if orchestrator.is_some() {
        info!("AI ensemble active");
    } else {
        info!("AI ensemble disabled or unconfigured; pipeline runs on technical signals only");
    }

    let paper_exchange = Arc::new(PaperExchange::new());
    seed_paper_exchange(&paper_exchange, &symbols);
    let exchange: Arc<dyn ExchangeAdapter> = paper_exchange;

    let engine = Arc::new(ExecutionEngine::new(config.clone(), orchestrator, exchange.clone()));
    let risk_manager = RiskManager::new(config.initial_balance, RiskParameters::from_config(&config));
    let mode_manager =
        Arc::new(ModeManager::new(cli.mode.into(), config.clone(), engine, exchange, risk_manager));

    let cancel = CancellationToken::new();

    let api_state = ApiState { mode_manager: mode_manager.clone() };
    let app: Router = api_router(api_state).layer(CorsLayer::permissive());
    let listener = TcpListener::bind(&cli.listen_addr).await.context("failed to bind listen address")?;
    info!(addr = %cli.listen_addr, "stats/confirmation API listening");

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let loop_cancel = cancel.clone();
    let loop_handle = tokio::spawn(run_tick_loop(
        mode_manager.clone(),
        symbols,
        cli.tick_interval_s,
        loop_cancel,
    ));

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received, draining");
    cancel.cancel();

    let _ = loop_handle.await;
    if let Err(err) = server.await.context("server task panicked")? {
        warn!(error = %err, "server shutdown with error");
    }

    info!("confluence signal engine stopped");
    Ok(())
}

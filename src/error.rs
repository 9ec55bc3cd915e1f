//! Crate-wide error types.
//!
//! Each subsystem gets a `thiserror` enum at its seam; `anyhow::Result` is
//! used at the application boundary (the tick loop, `main.rs`). Transient
//! upstream failures never reach these types — they are retried inside the
//! provider adapter and only surface as a populated `AIResponse.error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("provider {provider} returned a non-retriable error: {message}")]
    Permanent { provider: String, message: String },

    #[error("provider {provider} returned a retriable error: {message}")]
    Transient { provider: String, message: String },

    #[error("provider {provider} timed out after {timeout_s}s")]
    Timeout { provider: String, timeout_s: u64 },

    #[error("transport error calling {1}: {0}")]
    Transport(#[source] reqwest::Error, String),
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("exchange transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("execution engine not fully initialized")]
    NotInitialized,

    #[error("no open trade for symbol {0}")]
    NoOpenTrade(String),

    #[error("exchange rejected order: {0}")]
    Exchange(#[from] ExchangeError),
}

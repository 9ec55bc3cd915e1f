pub mod engine;
pub mod trade;

pub use engine::{ExecutionEngine, MarketSnapshot, PipelineStats};

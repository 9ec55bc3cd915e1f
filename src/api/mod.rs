//! HTTP surface: pipeline stats and the SEMI_AUTO confirmation channel.

pub mod routes;

pub use routes::{api_router, ApiState};

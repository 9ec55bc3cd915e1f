//! Stats and confirmation-channel handlers, mounted by `main.rs`.

use axum::{
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ai::types::OrchestratorStats;
use crate::execution::PipelineStats;
use crate::mode_manager::{ModeManager, TradingMode};

#[derive(Clone)]
pub struct ApiState {
    pub mode_manager: Arc<ModeManager>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub mode: TradingMode,
    pub pipeline: PipelineStats,
    pub open_trades: usize,
    pub ai_providers: Option<OrchestratorStats>,
}

async fn get_stats(AxumState(state): AxumState<ApiState>) -> Json<StatsResponse> {
    let pipeline = state.mode_manager.engine().stats();
    let open_trades = state.mode_manager.engine().open_trade_count().await;
    let ai_providers = state.mode_manager.engine().orchestrator_stats();
    Json(StatsResponse { mode: state.mode_manager.mode(), pipeline, open_trades, ai_providers })
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub symbol: String,
    pub direction: String,
    pub entry_price: f64,
    pub confidence: f64,
    pub score: f64,
    pub received_at: String,
}

async fn list_pending(AxumState(state): AxumState<ApiState>) -> Json<Vec<PendingResponse>> {
    let pending = state.mode_manager.pending_confirmations().await;
    Json(
        pending
            .into_iter()
            .map(|(symbol, p)| PendingResponse {
                symbol,
                direction: p.signal.direction.as_str().to_string(),
                entry_price: p.signal.entry_price,
                confidence: p.signal.confidence,
                score: p.signal.score,
                received_at: p.received_at.to_rfc3339(),
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub approve: bool,
}

async fn confirm(
    AxumState(state): AxumState<ApiState>,
    Path(symbol): Path<String>,
    Json(request): Json<ConfirmRequest>,
) -> Result<StatusCode, StatusCode> {
    if state.mode_manager.confirm(&symbol, request.approve).await {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: TradingMode,
}

async fn set_mode(
    AxumState(state): AxumState<ApiState>,
    Json(request): Json<SetModeRequest>,
) -> StatusCode {
    state.mode_manager.set_mode(request.mode).await;
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct EmergencyStopResponse {
    pub closed_trades: usize,
}

async fn emergency_stop(AxumState(state): AxumState<ApiState>) -> Json<EmergencyStopResponse> {
    let closed = state.mode_manager.emergency_stop().await;
    Json(EmergencyStopResponse { closed_trades: closed.len() })
}

pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/confirmations", get(list_pending))
        .route("/confirm/:symbol", post(confirm))
        .route("/mode", post(set_mode))
        .route("/risk/emergency-stop", post(emergency_stop))
        .with_state(state)
}

//! Health and stats handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::ApiResult;
use crate::routes::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Jobs currently waiting in the delivery queue.
    pub queue_depth: u64,
    /// Events whose fan-out batch could not be queued since startup.
    pub failed_fanouts: u64,
    pub worker_count: usize,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let queue_depth = state.fanout.queue_depth().await?;

    Ok(Json(StatsResponse {
        queue_depth,
        failed_fanouts: state.fanout.failed_fanouts(),
        worker_count: state.worker_count,
    }))
}

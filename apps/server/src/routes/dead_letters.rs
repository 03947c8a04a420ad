//! Dead letter queue handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use hookrelay_db::models::DeadLetter;

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub subscriber_id: Option<Uuid>,
    #[serde(default)]
    pub resolved: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<DeadLetter>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let letters = DeadLetter::list(&state.pool, query.subscriber_id, query.resolved, limit).await?;
    Ok(Json(letters))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeadLetter>> {
    let letter = DeadLetter::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("dead letter"))?;
    Ok(Json(letter))
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<DeadLetter>> {
    if req.resolved_by.trim().is_empty() {
        return Err(ApiError::Validation("resolved_by is required".to_string()));
    }

    let resolved = DeadLetter::resolve(&state.pool, id, req.resolved_by.trim()).await?;
    if !resolved {
        return Err(ApiError::NotFound("unresolved dead letter"));
    }

    let letter = DeadLetter::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("dead letter"))?;

    tracing::info!(
        target: "api",
        dead_letter_id = %id,
        resolved_by = %req.resolved_by.trim(),
        "Dead letter resolved"
    );

    Ok(Json(letter))
}

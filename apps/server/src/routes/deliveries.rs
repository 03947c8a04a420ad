//! Delivery attempt inspection handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use hookrelay_db::models::{AttemptFilter, DeliveryAttempt};

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub event_id: Option<Uuid>,
    pub subscriber_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<DeliveryAttempt>>> {
    if let Some(status) = &query.status {
        if status != "success" && status != "failed" {
            return Err(ApiError::Validation(format!(
                "invalid status filter: {status:?}"
            )));
        }
    }

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let attempts = DeliveryAttempt::list(
        &state.pool,
        AttemptFilter {
            event_id: query.event_id,
            subscriber_id: query.subscriber_id,
            status: query.status,
        },
        limit,
    )
    .await?;

    Ok(Json(attempts))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeliveryAttempt>> {
    let attempt = DeliveryAttempt::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("delivery attempt"))?;
    Ok(Json(attempt))
}

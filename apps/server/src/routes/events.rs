//! Event publishing and inspection handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hookrelay_db::models::{Event, NewEvent};

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    pub event_type: String,
    pub payload: Option<serde_json::Value>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishEventResponse {
    pub event_id: Uuid,
    pub event_type: String,
    pub deliveries_queued: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn publish(
    State(state): State<AppState>,
    Json(req): Json<PublishEventRequest>,
) -> ApiResult<(StatusCode, Json<PublishEventResponse>)> {
    validate_event_type(&req.event_type)?;
    let payload = req
        .payload
        .ok_or_else(|| ApiError::Validation("payload is required".to_string()))?;

    let event = Event::create(
        &state.pool,
        NewEvent {
            event_type: req.event_type,
            payload,
            source: req.source,
        },
    )
    .await?;

    // The event is durable from here on. A fan-out failure is reported as
    // zero queued deliveries, not as a request failure.
    let deliveries_queued = match state.fanout.fan_out(&event).await {
        Ok(count) => count,
        Err(e) => {
            tracing::error!(
                target: "api",
                event_id = %event.id,
                error = %e,
                "Fan-out failed for persisted event"
            );
            0
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(PublishEventResponse {
            event_id: event.id,
            event_type: event.event_type,
            deliveries_queued,
        }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Event>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let events = Event::list(&state.pool, limit).await?;
    Ok(Json(events))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Event>> {
    let event = Event::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("event"))?;
    Ok(Json(event))
}

/// Concrete event types are dot-delimited identifiers with no wildcards.
fn validate_event_type(event_type: &str) -> Result<(), ApiError> {
    let valid = !event_type.is_empty()
        && event_type.split('.').all(|seg| {
            !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "invalid event type: {event_type:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_event_type_accepts_dotted_identifiers() {
        assert!(validate_event_type("order.created").is_ok());
        assert!(validate_event_type("payment").is_ok());
        assert!(validate_event_type("a.b.c_d").is_ok());
    }

    #[test]
    fn test_validate_event_type_rejects_wildcards_and_malformed() {
        assert!(validate_event_type("").is_err());
        assert!(validate_event_type("order.*").is_err());
        assert!(validate_event_type("*").is_err());
        assert!(validate_event_type("order..created").is_err());
        assert!(validate_event_type("order created").is_err());
    }
}

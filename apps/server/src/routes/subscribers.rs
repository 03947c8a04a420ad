//! Subscriber CRUD handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use hookrelay_db::models::{NewSubscriber, Subscriber, Subscription, UpdateSubscriber};
use hookrelay_delivery::BreakerView;

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriberRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub endpoint_url: String,
    #[validate(length(min = 1))]
    pub event_types: Vec<String>,
}

/// The secret is returned exactly once, at creation time.
#[derive(Debug, Serialize)]
pub struct CreateSubscriberResponse {
    pub id: Uuid,
    pub name: String,
    pub secret_key: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriberDetail {
    #[serde(flatten)]
    pub subscriber: Subscriber,
    pub subscriptions: Vec<Subscription>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriberRequest {
    pub name: Option<String>,
    pub endpoint_url: Option<String>,
    pub is_active: Option<bool>,
    pub rate_limit_per_second: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SubscriberHealth {
    pub subscriber_id: Uuid,
    pub circuit: BreakerView,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriberRequest>,
) -> ApiResult<(StatusCode, Json<CreateSubscriberResponse>)> {
    req.validate()?;
    if url::parse_check(&req.endpoint_url).is_err() {
        return Err(ApiError::Validation(format!(
            "invalid endpoint URL: {}",
            req.endpoint_url
        )));
    }
    for pattern in &req.event_types {
        validate_pattern(pattern)?;
    }

    let subscriber = Subscriber::create_with_subscriptions(
        &state.pool,
        NewSubscriber {
            name: req.name,
            endpoint_url: req.endpoint_url,
            secret_key: generate_secret_key(),
        },
        &req.event_types,
    )
    .await?;

    tracing::info!(
        target: "api",
        subscriber_id = %subscriber.id,
        "Subscriber created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateSubscriberResponse {
            id: subscriber.id,
            name: subscriber.name,
            secret_key: subscriber.secret_key,
        }),
    ))
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Subscriber>>> {
    let subscribers = Subscriber::list(&state.pool).await?;
    Ok(Json(subscribers))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SubscriberDetail>> {
    let subscriber = Subscriber::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("subscriber"))?;
    let subscriptions = Subscription::list_by_subscriber(&state.pool, id).await?;

    Ok(Json(SubscriberDetail {
        subscriber,
        subscriptions,
    }))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSubscriberRequest>,
) -> ApiResult<Json<Subscriber>> {
    if let Some(url) = &req.endpoint_url {
        if url::parse_check(url).is_err() {
            return Err(ApiError::Validation(format!("invalid endpoint URL: {url}")));
        }
    }
    if let Some(limit) = req.rate_limit_per_second {
        if limit < 0 {
            return Err(ApiError::Validation(
                "rate_limit_per_second must be >= 0".to_string(),
            ));
        }
    }

    let subscriber = Subscriber::update(
        &state.pool,
        id,
        UpdateSubscriber {
            name: req.name,
            endpoint_url: req.endpoint_url,
            is_active: req.is_active,
            rate_limit_per_second: req.rate_limit_per_second,
        },
    )
    .await?
    .ok_or(ApiError::NotFound("subscriber"))?;

    Ok(Json(subscriber))
}

pub async fn health(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SubscriberHealth>> {
    Subscriber::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("subscriber"))?;

    let circuit = state.breaker.get_state(id).await;
    Ok(Json(SubscriberHealth {
        subscriber_id: id,
        circuit,
    }))
}

/// A subscription pattern is `*`, a literal dot-delimited type, or a
/// dot-delimited type with a final `*` segment.
fn validate_pattern(pattern: &str) -> Result<(), ApiError> {
    if pattern == "*" {
        return Ok(());
    }

    let segments: Vec<&str> = pattern.split('.').collect();
    let valid = segments.len() > 1
        && segments.iter().enumerate().all(|(i, seg)| {
            if *seg == "*" {
                i == segments.len() - 1
            } else {
                !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
        });

    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "invalid event type pattern: {pattern:?}"
        )))
    }
}

fn generate_secret_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("whrly_{}", hex::encode(bytes))
}

mod url {
    /// Lightweight endpoint URL check: scheme and non-empty host.
    pub fn parse_check(url: &str) -> Result<(), ()> {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or(())?;
        let host = rest.split(['/', '?', '#']).next().unwrap_or("");
        if host.is_empty() {
            return Err(());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pattern_accepts_literal_and_wildcards() {
        assert!(validate_pattern("order.created").is_ok());
        assert!(validate_pattern("order.*").is_ok());
        assert!(validate_pattern("*").is_ok());
        assert!(validate_pattern("a.b.c").is_ok());
    }

    #[test]
    fn test_validate_pattern_rejects_malformed() {
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("order").is_err());
        assert!(validate_pattern("order.").is_err());
        assert!(validate_pattern(".created").is_err());
        assert!(validate_pattern("*.created").is_err());
        assert!(validate_pattern("order created").is_err());
    }

    #[test]
    fn test_generate_secret_key_shape() {
        let key = generate_secret_key();
        assert!(key.starts_with("whrly_"));
        // 32 bytes hex-encoded
        assert_eq!(key.len(), 6 + 64);
    }

    #[test]
    fn test_secret_keys_are_unique() {
        assert_ne!(generate_secret_key(), generate_secret_key());
    }

    #[test]
    fn test_url_check() {
        assert!(url::parse_check("https://example.com/hook").is_ok());
        assert!(url::parse_check("http://localhost:8080").is_ok());
        assert!(url::parse_check("ftp://example.com").is_err());
        assert!(url::parse_check("https://").is_err());
        assert!(url::parse_check("example.com").is_err());
    }
}

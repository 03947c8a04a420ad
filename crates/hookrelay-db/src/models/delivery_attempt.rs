//! Delivery attempt database model.
//!
//! Append-only: one row per physical delivery attempt. Attempt numbers for a
//! given (event, subscriber) pair start at 1 and increase strictly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// Database entity for a recorded delivery attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subscriber_id: Uuid,
    pub attempt_number: i32,
    pub status: String,
    pub http_status_code: Option<i16>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i32>,
    pub error_message: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a delivery attempt.
#[derive(Debug, Clone)]
pub struct NewDeliveryAttempt {
    pub event_id: Uuid,
    pub subscriber_id: Uuid,
    pub attempt_number: i32,
    pub status: String,
    pub http_status_code: Option<i16>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i32>,
    pub error_message: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Optional filters for listing delivery attempts.
#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub event_id: Option<Uuid>,
    pub subscriber_id: Option<Uuid>,
    pub status: Option<String>,
}

impl DeliveryAttempt {
    /// Insert one attempt row.
    pub async fn create(pool: &PgPool, input: NewDeliveryAttempt) -> Result<Self, DbError> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO delivery_attempts (
                event_id, subscriber_id, attempt_number, status,
                http_status_code, response_body, response_time_ms,
                error_message, next_retry_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(input.event_id)
        .bind(input.subscriber_id)
        .bind(input.attempt_number)
        .bind(&input.status)
        .bind(input.http_status_code)
        .bind(&input.response_body)
        .bind(input.response_time_ms)
        .bind(&input.error_message)
        .bind(input.next_retry_at)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Find an attempt by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as(r#"SELECT * FROM delivery_attempts WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    /// List attempts matching the filter, newest first.
    pub async fn list(
        pool: &PgPool,
        filter: AttemptFilter,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM delivery_attempts
            WHERE ($1::uuid IS NULL OR event_id = $1)
              AND ($2::uuid IS NULL OR subscriber_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.event_id)
        .bind(filter.subscriber_id)
        .bind(filter.status)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// List the ordered attempt history for one (event, subscriber) pair.
    pub async fn history(
        pool: &PgPool,
        event_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM delivery_attempts
            WHERE event_id = $1 AND subscriber_id = $2
            ORDER BY attempt_number
            "#,
        )
        .bind(event_id)
        .bind(subscriber_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

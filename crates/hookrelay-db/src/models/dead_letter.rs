//! Dead letter queue database model.
//!
//! Records deliveries that exhausted all attempts, retained for operator
//! inspection and resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// Database entity for a dead-lettered delivery.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subscriber_id: Uuid,
    pub total_attempts: i32,
    pub last_http_status: Option<i16>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

/// Input for inserting a dead letter.
#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    pub event_id: Uuid,
    pub subscriber_id: Uuid,
    pub total_attempts: i32,
    pub last_http_status: Option<i16>,
    pub last_error: Option<String>,
}

impl DeadLetter {
    /// Insert a dead letter row.
    ///
    /// The (event, subscriber) pair is unique; a duplicate insert from a
    /// redundant delivery is silently ignored and `None` is returned.
    pub async fn create(pool: &PgPool, input: NewDeadLetter) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO dead_letter_queue (
                event_id, subscriber_id, total_attempts, last_http_status, last_error
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id, subscriber_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(input.event_id)
        .bind(input.subscriber_id)
        .bind(input.total_attempts)
        .bind(input.last_http_status)
        .bind(&input.last_error)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Find a dead letter by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as(r#"SELECT * FROM dead_letter_queue WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    /// List dead letters, optionally scoped to a subscriber, filtered by
    /// resolution state, newest first.
    pub async fn list(
        pool: &PgPool,
        subscriber_id: Option<Uuid>,
        resolved: bool,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM dead_letter_queue
            WHERE ($1::uuid IS NULL OR subscriber_id = $1)
              AND (($2 AND resolved_at IS NOT NULL) OR (NOT $2 AND resolved_at IS NULL))
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(subscriber_id)
        .bind(resolved)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Mark a dead letter as resolved. Returns `false` if it does not exist
    /// or was already resolved.
    pub async fn resolve(pool: &PgPool, id: Uuid, resolved_by: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE dead_letter_queue
            SET resolved_at = NOW(), resolved_by = $2
            WHERE id = $1 AND resolved_at IS NULL
            "#,
        )
        .bind(id)
        .bind(resolved_by)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

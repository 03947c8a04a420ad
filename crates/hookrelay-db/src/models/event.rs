//! Event database model.
//!
//! Events are immutable once created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// Database entity for a published event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for persisting a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub source: Option<String>,
}

impl Event {
    /// Persist a new event.
    pub async fn create(pool: &PgPool, input: NewEvent) -> Result<Self, DbError> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO events (event_type, payload, source)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&input.event_type)
        .bind(&input.payload)
        .bind(&input.source)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Find an event by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as(r#"SELECT * FROM events WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    /// List recent events, newest first.
    pub async fn list(pool: &PgPool, limit: i64) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM events
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

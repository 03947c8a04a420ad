//! Subscription database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// Database entity for an event-type subscription.
///
/// `event_type` holds a pattern: a literal type (`order.created`), a
/// trailing wildcard (`order.*`), or the universal wildcard (`*`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub event_type: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Add a subscription pattern for a subscriber.
    pub async fn create(
        pool: &PgPool,
        subscriber_id: Uuid,
        pattern: &str,
    ) -> Result<Self, DbError> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO subscriptions (subscriber_id, event_type)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(subscriber_id)
        .bind(pattern)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// List subscriptions for a subscriber in creation order.
    pub async fn list_by_subscriber(
        pool: &PgPool,
        subscriber_id: Uuid,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM subscriptions
            WHERE subscriber_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(subscriber_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

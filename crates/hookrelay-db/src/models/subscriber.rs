//! Subscriber database model.
//!
//! A subscriber owns an endpoint URL, a signing secret, and a set of
//! event-type subscriptions. The pipeline reads subscribers only through
//! [`Subscriber::find_match_candidates`]; everything else serves the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// Database entity for a webhook subscriber.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub name: String,
    pub endpoint_url: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub is_active: bool,
    pub rate_limit_per_second: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new subscriber.
#[derive(Debug, Clone)]
pub struct NewSubscriber {
    pub name: String,
    pub endpoint_url: String,
    pub secret_key: String,
}

/// Partial update for a subscriber. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubscriber {
    pub name: Option<String>,
    pub endpoint_url: Option<String>,
    pub is_active: Option<bool>,
    pub rate_limit_per_second: Option<i32>,
}

/// A subscriber joined with the subscription pattern that matched an event
/// type. The pattern is kept so callers can refine SQL `LIKE` matches.
#[derive(Debug, Clone, FromRow)]
pub struct MatchCandidate {
    pub id: Uuid,
    pub name: String,
    pub endpoint_url: String,
    pub secret_key: String,
    pub is_active: bool,
    pub rate_limit_per_second: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pattern: String,
}

impl MatchCandidate {
    /// Discard the pattern, keeping the subscriber row.
    #[must_use]
    pub fn into_subscriber(self) -> Subscriber {
        Subscriber {
            id: self.id,
            name: self.name,
            endpoint_url: self.endpoint_url,
            secret_key: self.secret_key,
            is_active: self.is_active,
            rate_limit_per_second: self.rate_limit_per_second,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Subscriber {
    /// Create a subscriber together with one subscription per event-type
    /// pattern, in a single transaction.
    pub async fn create_with_subscriptions(
        pool: &PgPool,
        input: NewSubscriber,
        patterns: &[String],
    ) -> Result<Self, DbError> {
        let mut tx = pool.begin().await?;

        let subscriber: Subscriber = sqlx::query_as(
            r#"
            INSERT INTO subscribers (name, endpoint_url, secret_key)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.endpoint_url)
        .bind(&input.secret_key)
        .fetch_one(&mut *tx)
        .await?;

        for pattern in patterns {
            sqlx::query(
                r#"
                INSERT INTO subscriptions (subscriber_id, event_type)
                VALUES ($1, $2)
                "#,
            )
            .bind(subscriber.id)
            .bind(pattern)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(subscriber)
    }

    /// Find a subscriber by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as(r#"SELECT * FROM subscribers WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    /// List all subscribers, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as(r#"SELECT * FROM subscribers ORDER BY created_at DESC"#)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Apply a partial update, returning the updated row, or `None` if the
    /// subscriber does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        input: UpdateSubscriber,
    ) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as(
            r#"
            UPDATE subscribers SET
                name = COALESCE($2, name),
                endpoint_url = COALESCE($3, endpoint_url),
                is_active = COALESCE($4, is_active),
                rate_limit_per_second = COALESCE($5, rate_limit_per_second),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.name)
        .bind(input.endpoint_url)
        .bind(input.is_active)
        .bind(input.rate_limit_per_second)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Find active (subscriber, pattern) pairs whose subscription pattern
    /// matches the event type.
    ///
    /// The SQL applies literal, universal (`*`) and `LIKE`-based wildcard
    /// matching; the wildcard arm is a prefix match and therefore a superset
    /// of single-segment semantics. Callers refine with the returned pattern
    /// when stricter matching is configured.
    pub async fn find_match_candidates(
        pool: &PgPool,
        event_type: &str,
    ) -> Result<Vec<MatchCandidate>, DbError> {
        let rows = sqlx::query_as(
            r#"
            SELECT s.id, s.name, s.endpoint_url, s.secret_key, s.is_active,
                   s.rate_limit_per_second, s.created_at, s.updated_at,
                   sub.event_type AS pattern
            FROM subscribers s
            JOIN subscriptions sub ON sub.subscriber_id = s.id
            WHERE s.is_active = TRUE
              AND sub.is_active = TRUE
              AND (
                    sub.event_type = $1
                 OR sub.event_type = '*'
                 OR (
                        sub.event_type LIKE '%.*'
                    AND $1 LIKE REPLACE(sub.event_type, '.*', '.%')
                    )
              )
            ORDER BY s.created_at
            "#,
        )
        .bind(event_type)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

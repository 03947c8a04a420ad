//! Record store contract consumed by the pipeline.
//!
//! The pipeline only ever needs three durable operations: resolve the
//! subscribers matching an event type, append a delivery attempt, and insert
//! a dead letter. Everything else on the tables belongs to the API layer.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use hookrelay_db::models::{NewDeadLetter, NewDeliveryAttempt, Subscriber};

use crate::error::Result;
use crate::pattern::{self, WildcardScope};

/// Durable persistence operations required by the delivery pipeline.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All subscribers with an active subscription matching the event type,
    /// each returned once.
    async fn find_matching_subscribers(&self, event_type: &str) -> Result<Vec<Subscriber>>;

    /// Append one delivery attempt row.
    async fn record_delivery_attempt(&self, attempt: NewDeliveryAttempt) -> Result<()>;

    /// Insert a dead letter row.
    async fn insert_dead_letter(&self, dead_letter: NewDeadLetter) -> Result<()>;
}

/// PostgreSQL-backed record store.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    scope: WildcardScope,
}

impl PostgresRecordStore {
    /// Create a record store over an established connection pool.
    #[must_use]
    pub fn new(pool: PgPool, scope: WildcardScope) -> Self {
        Self { pool, scope }
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn find_matching_subscribers(&self, event_type: &str) -> Result<Vec<Subscriber>> {
        // The SQL wildcard arm is a prefix LIKE, a superset of single-segment
        // matching; refine here under the configured scope and collapse
        // multiple matching patterns per subscriber to one row.
        let candidates = Subscriber::find_match_candidates(&self.pool, event_type).await?;

        let mut seen = HashSet::new();
        let mut subscribers = Vec::new();
        for candidate in candidates {
            if !pattern::matches(&candidate.pattern, event_type, self.scope) {
                continue;
            }
            if seen.insert(candidate.id) {
                subscribers.push(candidate.into_subscriber());
            }
        }

        Ok(subscribers)
    }

    async fn record_delivery_attempt(&self, attempt: NewDeliveryAttempt) -> Result<()> {
        hookrelay_db::models::DeliveryAttempt::create(&self.pool, attempt).await?;
        Ok(())
    }

    async fn insert_dead_letter(&self, dead_letter: NewDeadLetter) -> Result<()> {
        let event_id = dead_letter.event_id;
        let subscriber_id = dead_letter.subscriber_id;

        // Insert returns None when the (event, subscriber) row already
        // exists: a duplicate delivery under at-least-once, not a failure.
        let inserted = hookrelay_db::models::DeadLetter::create(&self.pool, dead_letter).await?;
        if inserted.is_none() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %event_id,
                subscriber_id = %subscriber_id,
                "Dead letter already recorded for this pair"
            );
        }
        Ok(())
    }
}

//! Time-ordered pending job store.
//!
//! Jobs are keyed by their encoded bytes and scored by their
//! earliest-eligible delivery time in microseconds since epoch. The store's
//! atomic `remove` is the only coordination between competing dispatchers:
//! for a given encoding, at most one concurrent remove returns `true`.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;

use crate::error::Result;
use crate::job::DeliveryJob;

/// Sorted-set key holding pending delivery jobs.
pub const DELIVERY_QUEUE_KEY: &str = "hookrelay:delivery_queue";

/// Current time as a job-store score (microseconds since epoch).
#[must_use]
pub fn now_micros() -> f64 {
    Utc::now().timestamp_micros() as f64
}

/// A job-store score `delay` from now.
#[must_use]
pub fn micros_after(delay: std::time::Duration) -> f64 {
    now_micros() + delay.as_micros() as f64
}

/// Contract for the pending-delivery queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Idempotent insert; re-enqueueing the same encoding updates its score.
    async fn enqueue(&self, job: &DeliveryJob, score: f64) -> Result<()>;

    /// Insert all jobs in one batched operation with a shared score.
    /// Partial failure is reported as whole-batch failure.
    async fn enqueue_batch(&self, jobs: &[DeliveryJob], score: f64) -> Result<()>;

    /// Up to `batch_size` entries with `score <= now`, ascending by score.
    async fn claim_due(&self, now: f64, batch_size: usize) -> Result<Vec<(String, f64)>>;

    /// Atomically remove an entry, returning whether it was present.
    async fn remove(&self, raw: &str) -> Result<bool>;

    /// Number of pending jobs. Observability only.
    async fn size(&self) -> Result<u64>;
}

/// Redis sorted-set implementation of the job store.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    queue_key: String,
}

impl RedisJobStore {
    /// Create a job store over an established Redis connection.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            queue_key: DELIVERY_QUEUE_KEY.to_string(),
        }
    }

    /// Use a custom queue key (tests run against isolated keys).
    #[must_use]
    pub fn with_queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = key.into();
        self
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue(&self, job: &DeliveryJob, score: f64) -> Result<()> {
        let member = job.encode()?;
        let mut conn = self.conn.clone();
        redis::cmd("ZADD")
            .arg(&self.queue_key)
            .arg(score)
            .arg(member)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn enqueue_batch(&self, jobs: &[DeliveryJob], score: f64) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for job in jobs {
            let member = job.encode()?;
            pipe.cmd("ZADD").arg(&self.queue_key).arg(score).arg(member);
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn claim_due(&self, now: f64, batch_size: usize) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.queue_key)
            .arg("-inf")
            .arg(now)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(batch_size)
            .query_async(&mut conn)
            .await?;
        Ok(entries)
    }

    async fn remove(&self, raw: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("ZREM")
            .arg(&self.queue_key)
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn size(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("ZCARD")
            .arg(&self.queue_key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("queue_key", &self.queue_key)
            .finish_non_exhaustive()
    }
}

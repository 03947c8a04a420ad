//! Per-subscriber sliding-window rate limiter.
//!
//! Each subscriber has a sorted set of admission tokens scored by
//! millisecond timestamps. A Lua script evicts expired tokens, counts the
//! remainder, and either admits (inserting a new unique token) or refuses -
//! all in one atomic step, so concurrent workers and replicas cannot
//! overshoot the limit.
//!
//! A limit of `0` means unlimited and never touches the store. Store errors
//! fail open.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::Script;
use uuid::Uuid;

/// Sliding window length.
const WINDOW: Duration = Duration::from_secs(1);

// 1. Evict members outside the window.
// 2. Count what remains.
// 3. Under the limit: insert this admission, refresh the TTL, admit.
// 4. Otherwise refuse.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)

local count = redis.call('ZCARD', key)

if count < limit then
    redis.call('ZADD', key, now, member)
    redis.call('EXPIRE', key, window / 1000 + 1)
    return 1
else
    return 0
end
"#;

/// Sliding-window rate limiter over the shared key/value store.
#[derive(Clone)]
pub struct RateLimiter {
    conn: ConnectionManager,
    script: Script,
}

fn limiter_key(subscriber_id: Uuid) -> String {
    format!("hookrelay:rl:{subscriber_id}")
}

impl RateLimiter {
    /// Create a rate limiter over an established Redis connection.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }

    /// Check whether a delivery to this subscriber is within its rate limit.
    ///
    /// `limit` is the subscriber's requests-per-second budget; `0` admits
    /// unconditionally. Store errors admit the request.
    pub async fn allow(&self, subscriber_id: Uuid, limit: u32) -> bool {
        if limit == 0 {
            return true;
        }

        let now_ms = Utc::now().timestamp_millis();
        // Unique per call so repeated admissions within one window never
        // collide on the same member.
        let member = format!("{now_ms}:{}", rand::thread_rng().gen::<u32>());

        let mut conn = self.conn.clone();
        let result: Result<i64, _> = self
            .script
            .key(limiter_key(subscriber_id))
            .arg(now_ms)
            .arg(WINDOW.as_millis() as i64)
            .arg(i64::from(limit))
            .arg(member)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(1) => true,
            Ok(_) => {
                tracing::debug!(
                    target: "rate_limiter",
                    subscriber_id = %subscriber_id,
                    limit,
                    "Rate limited"
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    target: "rate_limiter",
                    subscriber_id = %subscriber_id,
                    error = %e,
                    "Rate limiter script failed - failing open"
                );
                true
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

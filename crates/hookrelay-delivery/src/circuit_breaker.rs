//! Per-subscriber circuit breaker backed by the shared key/value store.
//!
//! State lives in a Redis hash per subscriber so that every replica sees the
//! same view. Transitions: closed → open after `failure_threshold`
//! consecutive failures; open → half-open once the cooldown since the last
//! failure has elapsed; half-open → closed on a successful probe, back to
//! open on a failed one.
//!
//! Store errors never block delivery: every operation fails open and logs.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - deliveries proceed.
    #[default]
    Closed,
    /// Circuit tripped - deliveries rejected until the cooldown elapses.
    Open,
    /// Testing recovery - probe requests are allowed through.
    HalfOpen,
}

impl CircuitState {
    /// Convert to the stored string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }

    /// Parse from the stored string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "closed" => Some(Self::Closed),
            "open" => Some(Self::Open),
            "half-open" => Some(Self::HalfOpen),
            _ => None,
        }
    }
}

/// Observed breaker state for one subscriber.
///
/// A view only: an elapsed cooldown is reported as `HalfOpen` without
/// touching storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerView {
    pub state: CircuitState,
    pub failures: u32,
    pub last_failed_at: Option<DateTime<Utc>>,
}

impl Default for BreakerView {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failed_at: None,
        }
    }
}

/// Per-subscriber circuit breaker over the shared key/value store.
#[derive(Clone)]
pub struct CircuitBreaker {
    conn: ConnectionManager,
    failure_threshold: u32,
    cooldown: Duration,
}

fn breaker_key(subscriber_id: Uuid) -> String {
    format!("hookrelay:cb:{subscriber_id}")
}

impl CircuitBreaker {
    /// Create a circuit breaker with the given threshold and cooldown.
    #[must_use]
    pub fn new(conn: ConnectionManager, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            conn,
            failure_threshold,
            cooldown,
        }
    }

    /// Check whether a delivery to this subscriber may proceed.
    ///
    /// Returns the current state and the admission decision. An open circuit
    /// whose cooldown has elapsed transitions to half-open and admits the
    /// probe. Store errors admit the request.
    pub async fn allow_request(&self, subscriber_id: Uuid) -> (CircuitState, bool) {
        let key = breaker_key(subscriber_id);
        let mut conn = self.conn.clone();

        let data: HashMap<String, String> = match redis::cmd("HGETALL")
            .arg(&key)
            .query_async(&mut conn)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(
                    target: "circuit_breaker",
                    subscriber_id = %subscriber_id,
                    error = %e,
                    "Failed to read circuit breaker state - failing open"
                );
                return (CircuitState::Closed, true);
            }
        };

        if data.is_empty() {
            // No state yet: the circuit is closed by default.
            return (CircuitState::Closed, true);
        }

        let state = data
            .get("state")
            .and_then(|s| CircuitState::parse(s))
            .unwrap_or_default();
        let last_failed_at = data
            .get("last_failed_at")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        match state {
            CircuitState::Open => {
                let elapsed = Utc::now().timestamp() - last_failed_at;
                if elapsed >= self.cooldown.as_secs() as i64 {
                    // Cooldown elapsed: admit one probe in half-open.
                    if let Err(e) = redis::cmd("HSET")
                        .arg(&key)
                        .arg("state")
                        .arg(CircuitState::HalfOpen.as_str())
                        .query_async::<_, ()>(&mut conn)
                        .await
                    {
                        tracing::error!(
                            target: "circuit_breaker",
                            subscriber_id = %subscriber_id,
                            error = %e,
                            "Failed to persist half-open transition"
                        );
                    }
                    tracing::info!(
                        target: "circuit_breaker",
                        subscriber_id = %subscriber_id,
                        "Circuit breaker half-open - allowing probe"
                    );
                    (CircuitState::HalfOpen, true)
                } else {
                    (CircuitState::Open, false)
                }
            }
            CircuitState::HalfOpen => (CircuitState::HalfOpen, true),
            CircuitState::Closed => (CircuitState::Closed, true),
        }
    }

    /// Record a successful delivery: close the circuit and reset failures.
    pub async fn record_success(&self, subscriber_id: Uuid) {
        let key = breaker_key(subscriber_id);
        let mut conn = self.conn.clone();

        let prior: Option<String> = redis::cmd("HGET")
            .arg(&key)
            .arg("state")
            .query_async(&mut conn)
            .await
            .unwrap_or(None);

        if let Err(e) = redis::cmd("HSET")
            .arg(&key)
            .arg("state")
            .arg(CircuitState::Closed.as_str())
            .arg("failures")
            .arg(0)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            tracing::error!(
                target: "circuit_breaker",
                subscriber_id = %subscriber_id,
                error = %e,
                "Failed to record circuit breaker success"
            );
            return;
        }

        if prior.as_deref() == Some(CircuitState::HalfOpen.as_str()) {
            tracing::info!(
                target: "circuit_breaker",
                subscriber_id = %subscriber_id,
                "Circuit breaker closed after successful probe"
            );
        }
    }

    /// Record a failed delivery: bump the counter and open the circuit when
    /// the threshold is reached or a half-open probe fails.
    pub async fn record_failure(&self, subscriber_id: Uuid) {
        let key = breaker_key(subscriber_id);
        let mut conn = self.conn.clone();

        let failures: i64 = match redis::cmd("HINCRBY")
            .arg(&key)
            .arg("failures")
            .arg(1)
            .query_async(&mut conn)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(
                    target: "circuit_breaker",
                    subscriber_id = %subscriber_id,
                    error = %e,
                    "Failed to record circuit breaker failure"
                );
                return;
            }
        };

        if let Err(e) = redis::cmd("HSET")
            .arg(&key)
            .arg("last_failed_at")
            .arg(Utc::now().timestamp())
            .query_async::<_, ()>(&mut conn)
            .await
        {
            tracing::error!(
                target: "circuit_breaker",
                subscriber_id = %subscriber_id,
                error = %e,
                "Failed to record circuit breaker failure timestamp"
            );
        }

        let state: Option<String> = redis::cmd("HGET")
            .arg(&key)
            .arg("state")
            .query_async(&mut conn)
            .await
            .unwrap_or(None);
        let state = state.as_deref().and_then(CircuitState::parse);

        if state == Some(CircuitState::HalfOpen) {
            // Failed probe: back to open.
            self.set_state(&key, CircuitState::Open).await;
            tracing::warn!(
                target: "circuit_breaker",
                subscriber_id = %subscriber_id,
                "Circuit breaker re-opened after failed probe"
            );
        } else if failures >= i64::from(self.failure_threshold) {
            self.set_state(&key, CircuitState::Open).await;
            tracing::warn!(
                target: "circuit_breaker",
                subscriber_id = %subscriber_id,
                failures,
                threshold = self.failure_threshold,
                "Circuit breaker opened"
            );
        } else if state.is_none() {
            self.set_state(&key, CircuitState::Closed).await;
        }
    }

    /// Observe the breaker state without mutating storage.
    ///
    /// An open circuit with an elapsed cooldown is reported as half-open.
    pub async fn get_state(&self, subscriber_id: Uuid) -> BreakerView {
        let key = breaker_key(subscriber_id);
        let mut conn = self.conn.clone();

        let data: HashMap<String, String> = match redis::cmd("HGETALL")
            .arg(&key)
            .query_async(&mut conn)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(
                    target: "circuit_breaker",
                    subscriber_id = %subscriber_id,
                    error = %e,
                    "Failed to read circuit breaker state"
                );
                return BreakerView::default();
            }
        };

        if data.is_empty() {
            return BreakerView::default();
        }

        let mut state = data
            .get("state")
            .and_then(|s| CircuitState::parse(s))
            .unwrap_or_default();
        let failures = data
            .get("failures")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let last_failed_secs = data
            .get("last_failed_at")
            .and_then(|s| s.parse::<i64>().ok());

        if state == CircuitState::Open {
            let elapsed = Utc::now().timestamp() - last_failed_secs.unwrap_or(0);
            if elapsed >= self.cooldown.as_secs() as i64 {
                state = CircuitState::HalfOpen;
            }
        }

        BreakerView {
            state,
            failures,
            last_failed_at: last_failed_secs
                .filter(|&s| s > 0)
                .and_then(|s| Utc.timestamp_opt(s, 0).single()),
        }
    }

    async fn set_state(&self, key: &str, state: CircuitState) {
        let mut conn = self.conn.clone();
        if let Err(e) = redis::cmd("HSET")
            .arg(key)
            .arg("state")
            .arg(state.as_str())
            .query_async::<_, ()>(&mut conn)
            .await
        {
            tracing::error!(
                target: "circuit_breaker",
                error = %e,
                "Failed to persist circuit breaker state"
            );
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("failure_threshold", &self.failure_threshold)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_default() {
        assert_eq!(CircuitState::default(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_state_round_trip() {
        for state in [
            CircuitState::Closed,
            CircuitState::Open,
            CircuitState::HalfOpen,
        ] {
            assert_eq!(CircuitState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn test_circuit_state_invalid() {
        assert_eq!(CircuitState::parse("invalid"), None);
    }

    #[test]
    fn test_breaker_view_default_is_closed() {
        let view = BreakerView::default();
        assert_eq!(view.state, CircuitState::Closed);
        assert_eq!(view.failures, 0);
        assert!(view.last_failed_at.is_none());
    }

    #[test]
    fn test_breaker_key_per_subscriber() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(breaker_key(a), breaker_key(b));
        assert!(breaker_key(a).starts_with("hookrelay:cb:"));
    }
}

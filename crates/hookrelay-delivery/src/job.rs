//! The self-contained delivery job.
//!
//! A job snapshots everything a worker needs at fan-out time (endpoint,
//! secret, payload, rate limit), so workers never re-query the record store
//! and later subscriber edits are invisible to jobs already in flight.
//!
//! The JSON encoding of a job doubles as its identity in the job store:
//! claiming a job means atomically removing its encoded form.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DeliveryError;

/// A single (event, subscriber) delivery attempt queued in the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub event_id: Uuid,
    pub subscriber_id: Uuid,
    pub endpoint_url: String,
    /// Raw JSON payload text, posted verbatim as the request body.
    pub payload: String,
    pub secret_key: String,
    pub event_type: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Requests per second; `0` means unlimited.
    pub rate_limit_per_second: u32,
}

impl DeliveryJob {
    /// Encode the job to its canonical JSON form.
    pub fn encode(&self) -> Result<String, DeliveryError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a job from its JSON form.
    pub fn decode(raw: &str) -> Result<Self, DeliveryError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The follow-up job for the next attempt. All fields are preserved;
    /// only the attempt number grows.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Whether another attempt remains after this one fails.
    #[must_use]
    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> DeliveryJob {
        DeliveryJob {
            event_id: Uuid::new_v4(),
            subscriber_id: Uuid::new_v4(),
            endpoint_url: "https://example.com/hook".to_string(),
            payload: r#"{"o":1}"#.to_string(),
            secret_key: "whrly_abc".to_string(),
            event_type: "order.created".to_string(),
            attempt: 1,
            max_attempts: 5,
            rate_limit_per_second: 0,
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let original = job();
        let encoded = original.encode().unwrap();
        let decoded = DeliveryJob::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encoding_is_stable() {
        let j = job();
        assert_eq!(j.encode().unwrap(), j.encode().unwrap());
    }

    #[test]
    fn test_next_attempt_increments_only_attempt() {
        let j = job();
        let next = j.next_attempt();
        assert_eq!(next.attempt, 2);
        assert_eq!(next.event_id, j.event_id);
        assert_eq!(next.payload, j.payload);
        assert_eq!(next.max_attempts, j.max_attempts);
    }

    #[test]
    fn test_has_attempts_left_boundary() {
        let mut j = job();
        j.attempt = 4;
        assert!(j.has_attempts_left());
        j.attempt = 5;
        assert!(!j.has_attempts_left());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(DeliveryJob::decode("not json").is_err());
    }
}

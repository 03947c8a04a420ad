//! Delivery progress notifier.
//!
//! A non-blocking fan-out of terminal delivery outcomes over a tokio
//! broadcast channel. Consumers (a dashboard hub, metrics scrapers)
//! subscribe for receivers; slow consumers lag and lose old events rather
//! than back-pressuring the deliverer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Terminal outcome categories published by the deliverer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    DeliverySuccess,
    DeliveryRetrying,
    DeliveryDlq,
}

/// A delivery progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub event_id: Uuid,
    pub subscriber_id: Uuid,
    pub endpoint_url: String,
    pub event_type: String,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub response_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast publisher for delivery progress.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Notifier {
    /// Create a notifier with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a progress event. Best-effort: an event with no subscribers
    /// is dropped silently, and lagging subscribers lose the oldest events.
    pub fn broadcast(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!(
                target: "webhook_delivery",
                "No progress subscribers - event dropped"
            );
        }
    }

    /// Get a new receiver for the progress stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}

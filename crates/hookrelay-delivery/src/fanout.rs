//! Event fan-out.
//!
//! Resolves an event to its matching active subscribers and enqueues one
//! self-contained delivery job per match, all in a single batched write with
//! the current time as the score.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hookrelay_db::models::Event;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::job::DeliveryJob;
use crate::job_store::{now_micros, JobStore};
use crate::records::RecordStore;

/// Turns one event into N queued delivery jobs.
pub struct FanoutEngine {
    records: Arc<dyn RecordStore>,
    jobs: Arc<dyn JobStore>,
    max_attempts: u32,
    failed_fanouts: AtomicU64,
}

impl FanoutEngine {
    /// Create a fan-out engine.
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        jobs: Arc<dyn JobStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            records,
            jobs,
            max_attempts: config.max_attempts,
            failed_fanouts: AtomicU64::new(0),
        }
    }

    /// Queue delivery jobs for every subscriber matching the event's type.
    ///
    /// Returns the number of jobs enqueued. A record-store read failure
    /// aborts fan-out; a job-store failure is reported whole-batch and the
    /// persisted event is left untouched, so the caller may retry
    /// (duplicates toward already-delivered subscribers are acceptable under
    /// at-least-once).
    pub async fn fan_out(&self, event: &Event) -> Result<usize> {
        let subscribers = self
            .records
            .find_matching_subscribers(&event.event_type)
            .await?;

        if subscribers.is_empty() {
            tracing::info!(
                target: "webhook_delivery",
                event_id = %event.id,
                event_type = %event.event_type,
                "No matching subscribers"
            );
            return Ok(0);
        }

        // Snapshot once: every job carries the payload text that will be
        // signed and posted verbatim.
        let payload = event.payload.to_string();

        let jobs: Vec<DeliveryJob> = subscribers
            .iter()
            .map(|sub| DeliveryJob {
                event_id: event.id,
                subscriber_id: sub.id,
                endpoint_url: sub.endpoint_url.clone(),
                payload: payload.clone(),
                secret_key: sub.secret_key.clone(),
                event_type: event.event_type.clone(),
                attempt: 1,
                max_attempts: self.max_attempts,
                rate_limit_per_second: sub.rate_limit_per_second.max(0) as u32,
            })
            .collect();

        if let Err(e) = self.jobs.enqueue_batch(&jobs, now_micros()).await {
            self.failed_fanouts.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                target: "webhook_delivery",
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Failed to queue fan-out batch"
            );
            return Err(e);
        }

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.id,
            event_type = %event.event_type,
            deliveries_queued = jobs.len(),
            "Fan-out complete"
        );

        Ok(jobs.len())
    }

    /// Current number of jobs waiting in the delivery queue.
    pub async fn queue_depth(&self) -> Result<u64> {
        self.jobs.size().await
    }

    /// Events whose fan-out batch could not be queued since startup.
    #[must_use]
    pub fn failed_fanouts(&self) -> u64 {
        self.failed_fanouts.load(Ordering::Relaxed)
    }
}

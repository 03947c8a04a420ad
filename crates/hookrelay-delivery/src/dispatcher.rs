//! Job store polling and claim.
//!
//! One dispatcher task per process. Every poll it asks the job store for due
//! entries and tries to claim each by atomic removal; losing the removal
//! race means another replica owns that job. Claimed jobs are decoded and
//! handed to the worker pool, whose bounded channel throttles the loop when
//! workers fall behind.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::job::DeliveryJob;
use crate::job_store::{now_micros, JobStore};
use crate::pool::Submitter;

/// Claims due jobs and feeds the worker pool.
pub struct Dispatcher {
    jobs: Arc<dyn JobStore>,
    submitter: Submitter,
    poll_interval: Duration,
    batch_size: usize,
}

impl Dispatcher {
    /// Create a dispatcher over the job store and a pool handle.
    #[must_use]
    pub fn new(jobs: Arc<dyn JobStore>, submitter: Submitter, config: &PipelineConfig) -> Self {
        Self {
            jobs,
            submitter,
            poll_interval: config.poll_interval,
            batch_size: config.dispatch_batch_size,
        }
    }

    /// Run the polling loop until cancelled.
    ///
    /// Cancellation stops the loop immediately; the queue is not drained.
    /// Jobs already handed to the pool run to completion.
    pub async fn run(self, token: CancellationToken) {
        tracing::info!(
            target: "webhook_delivery",
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            "Dispatcher started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(target: "webhook_delivery", "Dispatcher stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.poll().await;
                }
            }
        }
    }

    async fn poll(&self) {
        let due = match self.jobs.claim_due(now_micros(), self.batch_size).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Failed to poll delivery queue"
                );
                return;
            }
        };

        for (raw, _score) in due {
            // Claim by removal: exactly one dispatcher wins this entry.
            match self.jobs.remove(&raw).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        error = %e,
                        "Failed to claim job"
                    );
                    continue;
                }
            }

            let job = match DeliveryJob::decode(&raw) {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        error = %e,
                        "Discarding undecodable job"
                    );
                    continue;
                }
            };

            if self.submitter.submit(job).await.is_err() {
                tracing::warn!(
                    target: "webhook_delivery",
                    "Worker pool stopped - dispatcher exiting poll"
                );
                break;
            }
        }
    }
}

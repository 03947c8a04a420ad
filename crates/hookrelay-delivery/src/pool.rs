//! Fixed-size delivery worker pool.
//!
//! Workers consume from a bounded handoff channel of capacity twice the
//! worker count. When every worker is busy and the buffer is full,
//! `Submitter::submit` waits - that is the backpressure path that slows the
//! dispatcher down instead of piling up unbounded work.
//!
//! Closing the channel (dropping every submitter and calling
//! [`WorkerPool::stop`]) lets workers drain what was already handed off and
//! exit. Cancellation stops workers from picking up new jobs but never
//! aborts an in-flight delivery.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::deliverer::Deliverer;
use crate::error::DeliveryError;
use crate::job::DeliveryJob;

/// Cloneable handle for feeding jobs into the pool.
#[derive(Clone)]
pub struct Submitter {
    tx: mpsc::Sender<DeliveryJob>,
}

impl Submitter {
    /// Hand a job to the pool, waiting if the handoff buffer is full.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Internal` if the pool has stopped.
    pub async fn submit(&self, job: DeliveryJob) -> Result<(), DeliveryError> {
        self.tx
            .send(job)
            .await
            .map_err(|_| DeliveryError::Internal("worker pool stopped".to_string()))
    }
}

/// A fixed set of concurrent delivery workers.
pub struct WorkerPool {
    tx: mpsc::Sender<DeliveryJob>,
    handles: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `worker_count` workers consuming from a bounded channel of
    /// capacity `2 * worker_count`.
    #[must_use]
    pub fn start(
        worker_count: usize,
        deliverer: Deliverer,
        token: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(worker_count * 2);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..worker_count)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let deliverer = deliverer.clone();
                let token = token.clone();
                tokio::spawn(worker_loop(id, rx, deliverer, token))
            })
            .collect();

        tracing::info!(
            target: "webhook_delivery",
            worker_count,
            "Worker pool started"
        );

        Self {
            tx,
            handles,
            worker_count,
        }
    }

    /// Get a handle for submitting jobs.
    #[must_use]
    pub fn submitter(&self) -> Submitter {
        Submitter {
            tx: self.tx.clone(),
        }
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Close the handoff channel and wait for every worker to exit.
    ///
    /// Consumes the pool, so no further submitter can be minted afterwards.
    /// Outstanding submitter clones must be dropped first or workers will
    /// keep waiting for more jobs.
    pub async fn stop(self) {
        let WorkerPool { tx, handles, .. } = self;
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Worker task panicked"
                );
            }
        }

        tracing::info!(target: "webhook_delivery", "Worker pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DeliveryJob>>>,
    deliverer: Deliverer,
    token: CancellationToken,
) {
    loop {
        // The receiver lock is held only while waiting for a job, never
        // across a delivery, so idle workers contend and busy ones do not.
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        match job {
            Some(job) => deliverer.deliver(job).await,
            None => break,
        }
    }

    tracing::debug!(target: "webhook_delivery", worker = id, "Worker exited");
}

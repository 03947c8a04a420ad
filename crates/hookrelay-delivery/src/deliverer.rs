//! Signed HTTP delivery execution.
//!
//! The deliverer runs one job end to end: circuit breaker and rate limiter
//! admission, HMAC signing, the POST itself, outcome classification, attempt
//! recording, and either retry scheduling or the dead-letter transition.
//!
//! Admission deferrals re-enqueue the same job without incrementing its
//! attempt number; only a real HTTP attempt consumes one. The attempt row is
//! always recorded before the follow-up job is enqueued, which is what keeps
//! attempt numbers strictly ordered per (event, subscriber) pair.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;

use hookrelay_db::models::{NewDeadLetter, NewDeliveryAttempt};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::PipelineConfig;
use crate::crypto;
use crate::error::DeliveryError;
use crate::job::DeliveryJob;
use crate::job_store::{micros_after, JobStore};
use crate::notifier::{Notifier, ProgressEvent, ProgressKind};
use crate::rate_limiter::RateLimiter;
use crate::records::RecordStore;

/// Re-enqueue delay when the circuit is open.
const BREAKER_DEFER_DELAY: Duration = Duration::from_secs(5);

/// Re-enqueue delay when the rate limit refuses.
const RATE_LIMIT_DEFER_DELAY: Duration = Duration::from_secs(1);

/// Response bodies are stored truncated to this many characters.
const RESPONSE_BODY_LIMIT: usize = 1024;

/// Executes delivery jobs.
#[derive(Clone)]
pub struct Deliverer {
    http_client: reqwest::Client,
    records: Arc<dyn RecordStore>,
    jobs: Arc<dyn JobStore>,
    notifier: Notifier,
    circuit_breaker: Option<CircuitBreaker>,
    rate_limiter: Option<RateLimiter>,
    retry_base: u32,
    retry_jitter: Duration,
}

impl Deliverer {
    /// Create a deliverer with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Http` if the HTTP client cannot be built.
    pub fn new(
        records: Arc<dyn RecordStore>,
        jobs: Arc<dyn JobStore>,
        notifier: Notifier,
        config: &PipelineConfig,
    ) -> Result<Self, DeliveryError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("hookrelay/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http_client,
            records,
            jobs,
            notifier,
            circuit_breaker: None,
            rate_limiter: None,
            retry_base: config.retry_base,
            retry_jitter: config.retry_jitter,
        })
    }

    /// Gate deliveries behind a circuit breaker.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Gate deliveries behind a rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Execute one delivery job to completion.
    pub async fn deliver(&self, job: DeliveryJob) {
        // Admission: circuit breaker.
        if let Some(ref breaker) = self.circuit_breaker {
            let (state, admitted) = breaker.allow_request(job.subscriber_id).await;
            if !admitted {
                tracing::warn!(
                    target: "webhook_delivery",
                    event_id = %job.event_id,
                    subscriber_id = %job.subscriber_id,
                    state = state.as_str(),
                    "Delivery deferred - circuit open"
                );
                self.requeue_same_attempt(&job, BREAKER_DEFER_DELAY).await;
                return;
            }
        }

        // Admission: rate limiter.
        if job.rate_limit_per_second > 0 {
            if let Some(ref limiter) = self.rate_limiter {
                if !limiter
                    .allow(job.subscriber_id, job.rate_limit_per_second)
                    .await
                {
                    tracing::debug!(
                        target: "webhook_delivery",
                        event_id = %job.event_id,
                        subscriber_id = %job.subscriber_id,
                        limit = job.rate_limit_per_second,
                        "Delivery deferred - rate limited"
                    );
                    self.requeue_same_attempt(&job, RATE_LIMIT_DEFER_DELAY).await;
                    return;
                }
            }
        }

        let signature = crypto::compute_signature(&job.secret_key, job.payload.as_bytes());

        let start = Instant::now();
        let result = self
            .http_client
            .post(&job.endpoint_url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", signature)
            .header("X-Webhook-Event", &job.event_type)
            .header("X-Webhook-ID", job.event_id.to_string())
            .header("X-Webhook-Attempt", job.attempt.to_string())
            .body(job.payload.clone().into_bytes())
            .send()
            .await;
        let latency = start.elapsed();

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body: String = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(RESPONSE_BODY_LIMIT)
                    .collect();

                if (200..300).contains(&status) {
                    self.handle_success(&job, status, body, latency).await;
                } else {
                    self.handle_failure(
                        &job,
                        Some(status),
                        Some(body),
                        format!("HTTP {status}"),
                        latency,
                    )
                    .await;
                }
            }
            Err(e) => {
                let error_msg = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request error: {e}")
                };

                self.handle_failure(&job, None, None, error_msg, latency).await;
            }
        }
    }

    async fn handle_success(
        &self,
        job: &DeliveryJob,
        status: u16,
        body: String,
        latency: Duration,
    ) {
        tracing::info!(
            target: "webhook_delivery",
            event_id = %job.event_id,
            subscriber_id = %job.subscriber_id,
            attempt = job.attempt,
            status_code = status,
            response_time_ms = latency.as_millis() as u64,
            "Delivery succeeded"
        );

        self.record_attempt(job, "success", Some(status), Some(body), None, latency, None)
            .await;

        if let Some(ref breaker) = self.circuit_breaker {
            breaker.record_success(job.subscriber_id).await;
        }

        self.notify(job, ProgressKind::DeliverySuccess, Some(status), None, latency);
    }

    async fn handle_failure(
        &self,
        job: &DeliveryJob,
        status: Option<u16>,
        body: Option<String>,
        error: String,
        latency: Duration,
    ) {
        if let Some(ref breaker) = self.circuit_breaker {
            breaker.record_failure(job.subscriber_id).await;
        }

        if job.has_attempts_left() {
            let delay = retry_delay(self.retry_base, job.attempt, self.retry_jitter);
            let next_retry_at =
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

            tracing::warn!(
                target: "webhook_delivery",
                event_id = %job.event_id,
                subscriber_id = %job.subscriber_id,
                attempt = job.attempt,
                next_attempt = job.attempt + 1,
                next_retry_at = %next_retry_at.to_rfc3339(),
                status_code = status,
                error = %error,
                "Delivery failed - retry scheduled"
            );

            // Record the attempt before the follow-up job exists anywhere.
            self.record_attempt(
                job,
                "failed",
                status,
                body,
                Some(error.clone()),
                latency,
                Some(next_retry_at),
            )
            .await;

            let retry = job.next_attempt();
            if let Err(e) = self.jobs.enqueue(&retry, micros_after(delay)).await {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %job.event_id,
                    subscriber_id = %job.subscriber_id,
                    error = %e,
                    "Failed to enqueue retry - job lost to the queue"
                );
            }

            self.notify(job, ProgressKind::DeliveryRetrying, status, Some(error), latency);
        } else {
            tracing::error!(
                target: "webhook_delivery",
                event_id = %job.event_id,
                subscriber_id = %job.subscriber_id,
                total_attempts = job.attempt,
                status_code = status,
                error = %error,
                "Delivery permanently failed - dead-lettered"
            );

            self.record_attempt(job, "failed", status, body, Some(error.clone()), latency, None)
                .await;

            let dead_letter = NewDeadLetter {
                event_id: job.event_id,
                subscriber_id: job.subscriber_id,
                total_attempts: job.attempt as i32,
                last_http_status: status.map(|s| s as i16),
                last_error: Some(error.clone()),
            };
            if let Err(e) = self.records.insert_dead_letter(dead_letter).await {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %job.event_id,
                    subscriber_id = %job.subscriber_id,
                    error = %e,
                    "Failed to insert dead letter"
                );
            }

            self.notify(job, ProgressKind::DeliveryDlq, status, Some(error), latency);
        }
    }

    /// Put the same job back with a future score. The attempt number is
    /// untouched: admission deferrals are not attempts.
    async fn requeue_same_attempt(&self, job: &DeliveryJob, delay: Duration) {
        if let Err(e) = self.jobs.enqueue(job, micros_after(delay)).await {
            tracing::error!(
                target: "webhook_delivery",
                event_id = %job.event_id,
                subscriber_id = %job.subscriber_id,
                error = %e,
                "Failed to re-enqueue deferred job"
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_attempt(
        &self,
        job: &DeliveryJob,
        status: &str,
        http_status: Option<u16>,
        body: Option<String>,
        error: Option<String>,
        latency: Duration,
        next_retry_at: Option<chrono::DateTime<Utc>>,
    ) {
        let attempt = NewDeliveryAttempt {
            event_id: job.event_id,
            subscriber_id: job.subscriber_id,
            attempt_number: job.attempt as i32,
            status: status.to_string(),
            http_status_code: http_status.map(|s| s as i16),
            response_body: body.filter(|b| !b.is_empty()),
            response_time_ms: Some(latency.as_millis() as i32),
            error_message: error,
            next_retry_at,
        };

        // Recording is best-effort: the delivery already happened, and
        // at-least-once does not depend on this row.
        if let Err(e) = self.records.record_delivery_attempt(attempt).await {
            tracing::error!(
                target: "webhook_delivery",
                event_id = %job.event_id,
                subscriber_id = %job.subscriber_id,
                error = %e,
                "Failed to record delivery attempt"
            );
        }
    }

    fn notify(
        &self,
        job: &DeliveryJob,
        kind: ProgressKind,
        status: Option<u16>,
        error: Option<String>,
        latency: Duration,
    ) {
        self.notifier.broadcast(ProgressEvent {
            kind,
            event_id: job.event_id,
            subscriber_id: job.subscriber_id,
            endpoint_url: job.endpoint_url.clone(),
            event_type: job.event_type.clone(),
            attempt: job.attempt,
            status_code: status,
            response_ms: latency.as_millis() as u64,
            error,
            timestamp: Utc::now(),
        });
    }
}

/// Exponential backoff with jitter: `base^attempt` seconds plus a uniform
/// random slice of `jitter_max`.
#[must_use]
pub fn retry_delay(base: u32, attempt: u32, jitter_max: Duration) -> Duration {
    let base_secs = u64::from(base).saturating_pow(attempt);
    let jitter_ms = jitter_max.as_millis() as u64;
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..jitter_ms)
    };
    Duration::from_secs(base_secs) + Duration::from_millis(jitter)
}

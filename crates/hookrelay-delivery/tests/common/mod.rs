//! Common test utilities for hookrelay-delivery integration tests.
//!
//! Provides wiremock responders for endpoint behavior, in-memory record and
//! job store doubles, and fixtures, so the pipeline can be exercised without
//! a live database or Redis.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use hookrelay_db::models::{NewDeadLetter, NewDeliveryAttempt, Subscriber};
use hookrelay_delivery::error::{DeliveryError, Result};
use hookrelay_delivery::job::DeliveryJob;
use hookrelay_delivery::pattern::{self, WildcardScope};
use hookrelay_delivery::{JobStore, Notifier, PipelineConfig, RecordStore};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const SECRET_1: &str = "whrly_test_secret_key_12345";
pub const SECRET_2: &str = "whrly_another_secret_67890";

/// Pipeline config suitable for fast tests: no jitter, small pool.
pub fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_worker_count(4)
        .with_poll_interval(std::time::Duration::from_millis(10))
        .with_retry(2, std::time::Duration::ZERO)
}

/// A subscriber row for the in-memory record store.
pub fn subscriber(endpoint_url: &str, secret: &str, rate_limit: i32) -> Subscriber {
    let now = chrono::Utc::now();
    Subscriber {
        id: Uuid::new_v4(),
        name: "test subscriber".to_string(),
        endpoint_url: endpoint_url.to_string(),
        secret_key: secret.to_string(),
        is_active: true,
        rate_limit_per_second: rate_limit,
        created_at: now,
        updated_at: now,
    }
}

/// A first-attempt delivery job pointed at `endpoint_url`.
pub fn job(endpoint_url: &str, secret: &str, max_attempts: u32) -> DeliveryJob {
    DeliveryJob {
        event_id: Uuid::new_v4(),
        subscriber_id: Uuid::new_v4(),
        endpoint_url: endpoint_url.to_string(),
        payload: r#"{"o":1}"#.to_string(),
        secret_key: secret.to_string(),
        event_type: "order.created".to_string(),
        attempt: 1,
        max_attempts,
        rate_limit_per_second: 0,
    }
}

/// Drain every event currently buffered on a notifier subscription.
pub fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<hookrelay_delivery::ProgressEvent>,
) -> Vec<hookrelay_delivery::ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A notifier plus an attached receiver.
pub fn notifier_with_rx() -> (
    Notifier,
    tokio::sync::broadcast::Receiver<hookrelay_delivery::ProgressEvent>,
) {
    let notifier = Notifier::new(64);
    let rx = notifier.subscribe();
    (notifier, rx)
}

// ---------------------------------------------------------------------------
// In-memory record store
// ---------------------------------------------------------------------------

/// Record store double holding everything in memory.
#[derive(Default)]
pub struct InMemoryRecordStore {
    /// (subscriber, patterns) pairs; all treated as active.
    subscribers: Mutex<Vec<(Subscriber, Vec<String>)>>,
    attempts: Mutex<Vec<NewDeliveryAttempt>>,
    dead_letters: Mutex<Vec<NewDeadLetter>>,
    scope: WildcardScope,
    fail_writes: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_scope(scope: WildcardScope) -> Arc<Self> {
        Arc::new(Self {
            scope,
            ..Self::default()
        })
    }

    pub fn add_subscriber(&self, sub: Subscriber, patterns: &[&str]) {
        self.subscribers.lock().unwrap().push((
            sub,
            patterns.iter().map(|p| (*p).to_string()).collect(),
        ));
    }

    /// Make every write fail, to exercise best-effort recording paths.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<NewDeliveryAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    /// Attempts for one (event, subscriber) pair in recording order.
    pub fn attempts_for(&self, event_id: Uuid, subscriber_id: Uuid) -> Vec<NewDeliveryAttempt> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.event_id == event_id && a.subscriber_id == subscriber_id)
            .cloned()
            .collect()
    }

    pub fn dead_letters(&self) -> Vec<NewDeadLetter> {
        self.dead_letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_matching_subscribers(&self, event_type: &str) -> Result<Vec<Subscriber>> {
        let subscribers = self.subscribers.lock().unwrap();
        Ok(subscribers
            .iter()
            .filter(|(_, patterns)| {
                patterns
                    .iter()
                    .any(|p| pattern::matches(p, event_type, self.scope))
            })
            .map(|(sub, _)| sub.clone())
            .collect())
    }

    async fn record_delivery_attempt(&self, attempt: NewDeliveryAttempt) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DeliveryError::Internal("record store down".to_string()));
        }
        self.attempts.lock().unwrap().push(attempt);
        Ok(())
    }

    async fn insert_dead_letter(&self, dead_letter: NewDeadLetter) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DeliveryError::Internal("record store down".to_string()));
        }
        let mut letters = self.dead_letters.lock().unwrap();
        // Mirror the unique (event, subscriber) constraint.
        if !letters
            .iter()
            .any(|l| l.event_id == dead_letter.event_id && l.subscriber_id == dead_letter.subscriber_id)
        {
            letters.push(dead_letter);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory job store
// ---------------------------------------------------------------------------

/// Job store double over a scored map, with the same claim semantics as the
/// Redis sorted set: remove returns true for exactly one caller.
#[derive(Default)]
pub struct InMemoryJobStore {
    entries: Mutex<HashMap<String, f64>>,
    fail_enqueue: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every enqueue fail, to exercise fan-out failure reporting.
    pub fn fail_enqueue(&self) {
        self.fail_enqueue.store(true, Ordering::SeqCst);
    }

    /// All entries as (decoded job, score), ascending by score.
    pub fn entries(&self) -> Vec<(DeliveryJob, f64)> {
        let mut entries: Vec<(DeliveryJob, f64)> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(raw, score)| (DeliveryJob::decode(raw).unwrap(), *score))
            .collect();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1));
        entries
    }

    /// Remove and return the earliest-scored job regardless of its score.
    pub fn pop_earliest(&self) -> Option<(DeliveryJob, f64)> {
        let mut entries = self.entries.lock().unwrap();
        let raw = entries
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(raw, score)| (raw.clone(), *score))?;
        entries.remove(&raw.0);
        Some((DeliveryJob::decode(&raw.0).unwrap(), raw.1))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: &DeliveryJob, score: f64) -> Result<()> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(DeliveryError::Internal("job store down".to_string()));
        }
        self.entries.lock().unwrap().insert(job.encode()?, score);
        Ok(())
    }

    async fn enqueue_batch(&self, jobs: &[DeliveryJob], score: f64) -> Result<()> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(DeliveryError::Internal("job store down".to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        for job in jobs {
            entries.insert(job.encode()?, score);
        }
        Ok(())
    }

    async fn claim_due(&self, now: f64, batch_size: usize) -> Result<Vec<(String, f64)>> {
        let entries = self.entries.lock().unwrap();
        let mut due: Vec<(String, f64)> = entries
            .iter()
            .filter(|(_, &score)| score <= now)
            .map(|(raw, &score)| (raw.clone(), score))
            .collect();
        due.sort_by(|a, b| a.1.total_cmp(&b.1));
        due.truncate(batch_size);
        Ok(due)
    }

    async fn remove(&self, raw: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().remove(raw).is_some())
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.entries.lock().unwrap().len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Wiremock responders
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Capture requests and return 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Capture requests and return a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

/// A wiremock responder that fails a specified number of times before
/// succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Fail `n` times with 500, then return 200.
    pub fn fail_times(n: u32) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code: 500,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: 200,
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

//! Pipeline configuration.
//!
//! Loaded from environment variables with sensible defaults, or assembled
//! programmatically through the builder methods.

use std::env;
use std::time::Duration;

use crate::error::DeliveryError;
use crate::pattern::WildcardScope;

/// Tunables for the delivery pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of delivery workers.
    pub worker_count: usize,
    /// How often the dispatcher polls the job store.
    pub poll_interval: Duration,
    /// Maximum jobs claimed per dispatcher poll.
    pub dispatch_batch_size: usize,
    /// End-to-end timeout for a delivery HTTP request.
    pub http_timeout: Duration,
    /// Maximum delivery attempts per (event, subscriber) pair.
    pub max_attempts: u32,
    /// Base of the exponential retry backoff (`base^attempt` seconds).
    pub retry_base: u32,
    /// Upper bound of the uniform jitter added to each retry delay.
    pub retry_jitter: Duration,
    /// Consecutive failures before a subscriber's circuit opens.
    pub breaker_threshold: u32,
    /// How long an open circuit blocks deliveries before a probe.
    pub breaker_cooldown: Duration,
    /// Bound on graceful shutdown.
    pub shutdown_deadline: Duration,
    /// Trailing-wildcard matching semantics.
    pub wildcard_scope: WildcardScope,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 50,
            poll_interval: Duration::from_millis(100),
            dispatch_batch_size: 10,
            http_timeout: Duration::from_secs(10),
            max_attempts: 5,
            retry_base: 2,
            retry_jitter: Duration::from_millis(1000),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
            shutdown_deadline: Duration::from_secs(30),
            wildcard_scope: WildcardScope::Segment,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// Recognized variables (all optional):
    /// - `HOOKRELAY_WORKER_COUNT` (default 50)
    /// - `HOOKRELAY_POLL_INTERVAL_MS` (default 100)
    /// - `HOOKRELAY_DISPATCH_BATCH_SIZE` (default 10)
    /// - `HOOKRELAY_HTTP_TIMEOUT_SECS` (default 10)
    /// - `HOOKRELAY_MAX_ATTEMPTS` (default 5)
    /// - `HOOKRELAY_RETRY_BASE` (default 2)
    /// - `HOOKRELAY_RETRY_JITTER_MS` (default 1000)
    /// - `HOOKRELAY_BREAKER_THRESHOLD` (default 5)
    /// - `HOOKRELAY_BREAKER_COOLDOWN_SECS` (default 30)
    /// - `HOOKRELAY_SHUTDOWN_DEADLINE_SECS` (default 30)
    /// - `HOOKRELAY_WILDCARD_MATCH` (`segment` | `prefix`, default `segment`)
    pub fn from_env() -> Result<Self, DeliveryError> {
        let defaults = Self::default();

        let config = Self {
            worker_count: parse_positive("HOOKRELAY_WORKER_COUNT", defaults.worker_count as u64)?,
            poll_interval: Duration::from_millis(parse_positive(
                "HOOKRELAY_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            dispatch_batch_size: parse_positive(
                "HOOKRELAY_DISPATCH_BATCH_SIZE",
                defaults.dispatch_batch_size as u64,
            )?,
            http_timeout: Duration::from_secs(parse_positive(
                "HOOKRELAY_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
            max_attempts: parse_positive("HOOKRELAY_MAX_ATTEMPTS", u64::from(defaults.max_attempts))?,
            retry_base: parse_positive("HOOKRELAY_RETRY_BASE", u64::from(defaults.retry_base))?,
            retry_jitter: Duration::from_millis(parse_u64(
                "HOOKRELAY_RETRY_JITTER_MS",
                defaults.retry_jitter.as_millis() as u64,
            )?),
            breaker_threshold: parse_positive(
                "HOOKRELAY_BREAKER_THRESHOLD",
                u64::from(defaults.breaker_threshold),
            )?,
            breaker_cooldown: Duration::from_secs(parse_positive(
                "HOOKRELAY_BREAKER_COOLDOWN_SECS",
                defaults.breaker_cooldown.as_secs(),
            )?),
            shutdown_deadline: Duration::from_secs(parse_positive(
                "HOOKRELAY_SHUTDOWN_DEADLINE_SECS",
                defaults.shutdown_deadline.as_secs(),
            )?),
            wildcard_scope: match env::var("HOOKRELAY_WILDCARD_MATCH") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.wildcard_scope,
            },
        };

        Ok(config)
    }

    /// Set the worker count.
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the dispatcher poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the dispatch batch size.
    #[must_use]
    pub fn with_dispatch_batch_size(mut self, size: usize) -> Self {
        self.dispatch_batch_size = size;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the maximum delivery attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the retry backoff base and jitter bound.
    #[must_use]
    pub fn with_retry(mut self, base: u32, jitter: Duration) -> Self {
        self.retry_base = base;
        self.retry_jitter = jitter;
        self
    }

    /// Set the circuit breaker threshold and cooldown.
    #[must_use]
    pub fn with_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.breaker_threshold = threshold;
        self.breaker_cooldown = cooldown;
        self
    }

    /// Set the wildcard matching scope.
    #[must_use]
    pub fn with_wildcard_scope(mut self, scope: WildcardScope) -> Self {
        self.wildcard_scope = scope;
        self
    }
}

fn parse_u64(var: &str, default: u64) -> Result<u64, DeliveryError> {
    match env::var(var) {
        Ok(v) => v.parse::<u64>().map_err(|_| DeliveryError::ConfigInvalid {
            var: var.to_string(),
            reason: format!("expected an integer, got {v:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_positive<T: TryFrom<u64>>(var: &str, default: u64) -> Result<T, DeliveryError> {
    let value = parse_u64(var, default)?;
    if value == 0 {
        return Err(DeliveryError::ConfigInvalid {
            var: var.to_string(),
            reason: "must be a positive integer".to_string(),
        });
    }
    T::try_from(value).map_err(|_| DeliveryError::ConfigInvalid {
        var: var.to_string(),
        reason: "value out of range".to_string(),
    })
}

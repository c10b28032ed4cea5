//! Retry logic.
//!
//! # Responsibilities
//! - Execute an operation up to `max_attempts` times
//! - Wait between attempts using the configured backoff strategy + jitter
//! - Ask a caller-supplied predicate whether a failure is worth retrying
//! - Bound the whole sequence (attempts and sleeps) by an overall timeout
//!
//! Non-retryable failures return after the attempt that produced them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::{apply_jitter, calculate_backoff};
use crate::resilience::timeouts::{with_timeout, ResilienceError};
use crate::resilience::FailureKind;

/// Decides whether an error is worth another attempt.
pub type RetryCondition<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Reported once an operation gives up.
#[derive(Debug, Clone, Serialize)]
pub struct OperationFailed {
    pub name: String,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Callback invoked when an operation fails for good.
pub type FailureListener = Arc<dyn Fn(&OperationFailed) + Send + Sync>;

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub outcome: Result<T, E>,
    pub attempts: u32,
    pub total_duration: Duration,
}

/// Aggregate retry statistics.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RetryMetrics {
    pub name: String,
    pub total_attempts: u64,
    /// Operations that succeeded after more than one attempt.
    pub successful_retries: u64,
    pub failed_operations: u64,
    pub total_operations: u64,
    pub average_attempts: f64,
    pub average_duration_ms: f64,
    pub error_types: BTreeMap<String, u64>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl RetryMetrics {
    fn record_operation(&mut self, attempts: u32, duration: Duration) {
        self.total_operations += 1;
        let n = self.total_operations as f64;
        let ms = duration.as_secs_f64() * 1000.0;
        self.average_attempts += (attempts as f64 - self.average_attempts) / n;
        self.average_duration_ms += (ms - self.average_duration_ms) / n;
    }
}

/// Retry executor with backoff.
pub struct RetryHandler<E> {
    name: String,
    config: RetryConfig,
    condition: RetryCondition<E>,
    metrics: Mutex<RetryMetrics>,
    listener: Option<FailureListener>,
}

impl<E> std::fmt::Debug for RetryHandler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryHandler")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl<E> RetryHandler<E>
where
    E: From<ResilienceError> + Display + FailureKind,
{
    pub fn new(name: impl Into<String>, config: RetryConfig, condition: RetryCondition<E>) -> Self {
        let name = name.into();
        Self {
            metrics: Mutex::new(RetryMetrics {
                name: name.clone(),
                ..RetryMetrics::default()
            }),
            name,
            config,
            condition,
            listener: None,
        }
    }

    /// Register the give-up listener.
    pub fn with_listener(mut self, listener: FailureListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Delay before the attempt following the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max = Duration::from_millis(self.config.max_delay_ms);
        let delay = calculate_backoff(
            self.config.strategy,
            attempt,
            self.config.initial_delay_ms,
            self.config.max_delay_ms,
            self.config.backoff_factor,
        );
        if self.config.jitter {
            apply_jitter(delay, max)
        } else {
            delay
        }
    }

    /// Run `operation` with retries.
    pub async fn execute<T, Op, Fut>(&self, mut operation: Op) -> RetryResult<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        let outcome = match self.config.timeout_ms {
            Some(ms) if ms > 0 => {
                with_timeout(
                    Duration::from_millis(ms),
                    self.attempt_loop(&mut operation, &mut attempts),
                )
                .await
            }
            _ => self.attempt_loop(&mut operation, &mut attempts).await,
        };
        let total_duration = start.elapsed();

        match &outcome {
            Ok(_) => {
                let mut m = self.lock_metrics();
                if attempts > 1 {
                    m.successful_retries += 1;
                    tracing::info!(handler = %self.name, attempts, "Operation succeeded after retries");
                }
                m.last_success = Some(Utc::now());
                m.record_operation(attempts, total_duration);
            }
            Err(e) => {
                {
                    let mut m = self.lock_metrics();
                    m.failed_operations += 1;
                    m.last_failure = Some(Utc::now());
                    m.record_operation(attempts, total_duration);
                }
                tracing::error!(
                    handler = %self.name,
                    attempts,
                    duration_ms = total_duration.as_millis() as u64,
                    error = %e,
                    "Operation failed after retries"
                );
                if let Some(listener) = &self.listener {
                    listener(&OperationFailed {
                        name: self.name.clone(),
                        attempts,
                        duration_ms: total_duration.as_millis() as u64,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        RetryResult {
            outcome,
            attempts,
            total_duration,
        }
    }

    async fn attempt_loop<T, Op, Fut>(&self, operation: &mut Op, attempts: &mut u32) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        loop {
            *attempts += 1;
            self.lock_metrics().total_attempts += 1;
            metrics::record_retry_attempt(&self.name);

            tracing::debug!(handler = %self.name, attempt = *attempts, max_attempts, "Executing attempt");

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            *self
                .lock_metrics()
                .error_types
                .entry(err.failure_kind().to_string())
                .or_insert(0) += 1;

            let will_retry = *attempts < max_attempts && (self.condition)(&err);
            tracing::warn!(
                handler = %self.name,
                attempt = *attempts,
                error = %err,
                will_retry,
                "Attempt failed"
            );
            if !will_retry {
                return Err(err);
            }

            let delay = self.delay_for(*attempts);
            tracing::debug!(handler = %self.name, delay_ms = delay.as_millis() as u64, "Waiting before retry");
            tokio::time::sleep(delay).await;
        }
    }

    /// Snapshot metrics.
    pub fn metrics(&self) -> RetryMetrics {
        self.lock_metrics().clone()
    }

    pub fn reset_metrics(&self) {
        *self.lock_metrics() = RetryMetrics {
            name: self.name.clone(),
            ..RetryMetrics::default()
        };
    }

    fn lock_metrics(&self) -> MutexGuard<'_, RetryMetrics> {
        self.metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::backoff::BackoffStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
        Resilience(ResilienceError),
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl From<ResilienceError> for TestError {
        fn from(e: ResilienceError) -> Self {
            TestError::Resilience(e)
        }
    }

    impl FailureKind for TestError {
        fn failure_kind(&self) -> &str {
            match self {
                TestError::Transient => "transient",
                TestError::Fatal => "fatal",
                TestError::Resilience(_) => "resilience",
            }
        }
    }

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            initial_delay_ms: 100,
            max_delay_ms: 300,
            strategy: BackoffStrategy::Exponential,
            jitter: false,
            backoff_factor: 2.0,
            timeout_ms: None,
        }
    }

    fn handler(config: RetryConfig) -> RetryHandler<TestError> {
        RetryHandler::new("test", config, Arc::new(|e: &TestError| *e == TestError::Transient))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_with_growing_capped_delays() {
        let h = handler(config());
        let stamps = Mutex::new(Vec::new());

        let res = h
            .execute(|| {
                stamps.lock().unwrap().push(Instant::now());
                async { Err::<(), _>(TestError::Transient) }
            })
            .await;

        assert_eq!(res.attempts, 4);
        assert_eq!(res.outcome, Err(TestError::Transient));

        let stamps = stamps.lock().unwrap();
        let gaps: Vec<u128> = stamps.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        assert_eq!(gaps, vec![100, 200, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_returns_immediately() {
        let h = handler(config());
        let calls = AtomicU32::new(0);
        let res = h
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::Fatal) }
            })
            .await;
        assert_eq!(res.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.outcome, Err(TestError::Fatal));
        assert_eq!(h.metrics().error_types.get("fatal"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry_updates_metrics() {
        let h = handler(config());
        let calls = AtomicU32::new(0);
        let res = h
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TestError::Transient)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(res.outcome, Ok(2));
        let m = h.metrics();
        assert_eq!(m.successful_retries, 1);
        assert_eq!(m.total_attempts, 3);
        assert_eq!(m.total_operations, 1);
        assert!((m.average_attempts - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_timeout_bounds_sequence() {
        let mut cfg = config();
        cfg.timeout_ms = Some(250);
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let h = handler(cfg).with_listener(Arc::new(move |f: &OperationFailed| {
            sink.lock().unwrap().push(f.attempts);
        }));

        let res = h
            .execute(|| async { Err::<(), _>(TestError::Transient) })
            .await;
        assert_eq!(res.outcome, Err(TestError::Resilience(ResilienceError::Timeout(250))));
        // Attempts at t=0 and t=100; the sleep until t=300 is cut off.
        assert_eq!(res.attempts, 2);
        assert_eq!(*failures.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_jittered_delay_never_exceeds_max() {
        let mut cfg = config();
        cfg.jitter = true;
        let h = handler(cfg);
        for attempt in 1..10 {
            assert!(h.delay_for(attempt) <= Duration::from_millis(300));
        }
    }
}

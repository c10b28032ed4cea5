//! Circuit breaker for the payment provider.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: provider assumed down, calls short-circuit to the fallback
//! - Half-Open: trial calls allowed to test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call after `timeout` has elapsed since opening
//! Half-Open → Closed: consecutive trial successes >= success_threshold
//! Half-Open → Open: any trial failure
//! ```
//!
//! The lock guarding breaker state is never held across an `.await`; the
//! wrapped call runs outside it. Listeners are invoked after the lock is
//! released so they may read [`CircuitBreaker::metrics`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::{with_timeout, ResilienceError};

const MAX_RESPONSE_SAMPLES: usize = 1000;
const RETAINED_RESPONSE_SAMPLES: usize = 500;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Emitted on every state transition.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStateChange {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub timestamp: DateTime<Utc>,
}

/// Callback invoked on state transitions.
pub type StateListener = Arc<dyn Fn(&CircuitStateChange) + Send + Sync>;

/// Point-in-time view of the breaker for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    /// Failure ratio of calls inside the monitoring window.
    pub failure_rate: f64,
    pub average_response_time_ms: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub state_changes: u64,
    pub time_in_current_state_ms: u64,
}

/// Tagged result of a protected call.
#[derive(Debug)]
pub struct OperationResult<T, E> {
    pub outcome: Result<T, E>,
    /// True when the value (or error) came from the fallback.
    pub from_fallback: bool,
    pub execution_time: Duration,
    pub circuit_state: CircuitState,
}

impl<T, E> OperationResult<T, E> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

struct Sample {
    at: Instant,
    success: bool,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u64,
    response_times: VecDeque<Duration>,
    recent: VecDeque<Sample>,
    last_failure: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    state_changes: u64,
    state_changed_at: Instant,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            response_times: VecDeque::new(),
            recent: VecDeque::new(),
            last_failure: None,
            last_success: None,
            opened_at: None,
            opened_at_wall: None,
            state_changes: 0,
            state_changed_at: Instant::now(),
        }
    }

    fn reset_counters(&mut self) {
        self.failure_count = 0;
        self.success_count = 0;
        self.opened_at = None;
        self.opened_at_wall = None;
    }

    fn record_sample(&mut self, success: bool, elapsed: Duration, window: Duration) {
        let now = Instant::now();
        self.recent.push_back(Sample { at: now, success });
        self.prune(now, window);

        self.response_times.push_back(elapsed);
        if self.response_times.len() > MAX_RESPONSE_SAMPLES {
            let excess = self.response_times.len() - RETAINED_RESPONSE_SAMPLES;
            self.response_times.drain(..excess);
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.recent.front() {
            if now.saturating_duration_since(front.at) > window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let failures = self.recent.iter().filter(|s| !s.success).count();
        failures as f64 / self.recent.len() as f64
    }
}

/// Circuit breaker guarding a single remote dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    listener: Option<StateListener>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker in the closed state.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        tracing::info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout_ms,
            execution_timeout_ms = config.execution_timeout_ms,
            "Circuit breaker initialized"
        );
        metrics::record_circuit_state(&name, CircuitState::Closed);
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner::new()),
            listener: None,
        }
    }

    /// Register the state-change listener.
    pub fn with_listener(mut self, listener: StateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute `operation` under breaker protection, without a fallback.
    pub async fn execute<T, E, Op, Fut>(&self, operation: Op) -> OperationResult<T, E>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError> + Display,
    {
        self.run(operation, None::<fn() -> std::future::Ready<Result<T, E>>>)
            .await
    }

    /// Execute `operation`, serving `fallback` while the circuit is open.
    pub async fn execute_with_fallback<T, E, Op, Fut, Fb, FbFut>(
        &self,
        operation: Op,
        fallback: Fb,
    ) -> OperationResult<T, E>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        E: From<ResilienceError> + Display,
    {
        self.run(operation, Some(fallback)).await
    }

    async fn run<T, E, Op, Fut, Fb, FbFut>(
        &self,
        operation: Op,
        fallback: Option<Fb>,
    ) -> OperationResult<T, E>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        E: From<ResilienceError> + Display,
    {
        let start = Instant::now();

        if !self.admit() {
            tracing::warn!(breaker = %self.name, "Circuit breaker is open");
            return match fallback {
                Some(fb) => self.run_fallback(fb, start).await,
                None => OperationResult {
                    outcome: Err(ResilienceError::CircuitOpen(self.name.clone()).into()),
                    from_fallback: false,
                    execution_time: start.elapsed(),
                    circuit_state: CircuitState::Open,
                },
            };
        }

        let limit = Duration::from_millis(self.config.execution_timeout_ms);
        let result = with_timeout(limit, operation()).await;
        let elapsed = start.elapsed();

        match result {
            Ok(value) => {
                let state = self.record_success(elapsed);
                OperationResult {
                    outcome: Ok(value),
                    from_fallback: false,
                    execution_time: elapsed,
                    circuit_state: state,
                }
            }
            Err(e) => {
                let (state, failures) = self.record_failure(elapsed);
                tracing::error!(
                    breaker = %self.name,
                    state = %state,
                    failure_count = failures,
                    execution_time_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Circuit breaker operation failed"
                );

                match (state, fallback) {
                    (CircuitState::Open, Some(fb)) => self.run_fallback(fb, start).await,
                    _ => OperationResult {
                        outcome: Err(e),
                        from_fallback: false,
                        execution_time: elapsed,
                        circuit_state: state,
                    },
                }
            }
        }
    }

    async fn run_fallback<T, E, Fb, FbFut>(&self, fallback: Fb, start: Instant) -> OperationResult<T, E>
    where
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        metrics::record_fallback(&self.name);
        let outcome = fallback().await;
        let execution_time = start.elapsed();
        match &outcome {
            Ok(_) => tracing::info!(
                breaker = %self.name,
                execution_time_ms = execution_time.as_millis() as u64,
                "Fallback executed successfully"
            ),
            Err(e) => tracing::error!(breaker = %self.name, error = %e, "Fallback failed"),
        }
        OperationResult {
            outcome,
            from_fallback: true,
            execution_time,
            circuit_state: self.state(),
        }
    }

    /// Count the request and decide whether the primary may be called.
    fn admit(&self) -> bool {
        let change = {
            let mut inner = self.lock();
            inner.total_requests += 1;
            if inner.state != CircuitState::Open {
                return true;
            }

            let timeout = Duration::from_millis(self.config.timeout_ms);
            let cooled_down = inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= timeout);
            if !cooled_down {
                return false;
            }
            self.transition(&mut inner, CircuitState::HalfOpen)
        };
        self.notify(change);
        true
    }

    fn record_success(&self, elapsed: Duration) -> CircuitState {
        let window = Duration::from_millis(self.config.monitoring_window_ms);
        let (state, change) = {
            let mut inner = self.lock();
            inner.success_count += 1;
            inner.last_success = Some(Utc::now());
            inner.record_sample(true, elapsed, window);

            let mut change = None;
            match inner.state {
                CircuitState::Closed => inner.failure_count = 0,
                CircuitState::HalfOpen if inner.success_count >= self.config.success_threshold => {
                    change = self.transition(&mut inner, CircuitState::Closed);
                }
                _ => {}
            }
            (inner.state, change)
        };
        self.notify(change);
        state
    }

    fn record_failure(&self, elapsed: Duration) -> (CircuitState, u32) {
        let window = Duration::from_millis(self.config.monitoring_window_ms);
        let (state, failures, change) = {
            let mut inner = self.lock();
            inner.failure_count += 1;
            inner.last_failure = Some(Utc::now());
            inner.record_sample(false, elapsed, window);

            let change = match inner.state {
                CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                    self.transition(&mut inner, CircuitState::Open)
                }
                CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
                _ => None,
            };
            (inner.state, inner.failure_count, change)
        };
        self.notify(change);
        (state, failures)
    }

    /// Apply a transition under the lock; returns the event to publish.
    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) -> Option<CircuitStateChange> {
        let from = inner.state;
        if from == to {
            return None;
        }

        inner.state = to;
        inner.state_changes += 1;
        inner.state_changed_at = Instant::now();
        match to {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.opened_at_wall = Some(Utc::now());
            }
            CircuitState::HalfOpen => inner.success_count = 0,
            CircuitState::Closed => inner.reset_counters(),
        }

        tracing::info!(
            breaker = %self.name,
            from = %from,
            to = %to,
            failure_count = inner.failure_count,
            success_count = inner.success_count,
            "Circuit breaker state changed"
        );
        metrics::record_circuit_transition(&self.name, to);

        Some(CircuitStateChange {
            name: self.name.clone(),
            from,
            to,
            timestamp: Utc::now(),
        })
    }

    fn notify(&self, change: Option<CircuitStateChange>) {
        if let (Some(change), Some(listener)) = (change, &self.listener) {
            listener(&change);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// True when calls reach the primary (closed or half-open).
    pub fn is_allowing_requests(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Unhealthy when open for more than three cool-down periods, or when most
    /// recent calls fail.
    pub fn is_healthy(&self) -> bool {
        let inner = self.lock();
        if inner.state == CircuitState::Open {
            let open_for = inner.state_changed_at.elapsed();
            if open_for > Duration::from_millis(self.config.timeout_ms.saturating_mul(3)) {
                return false;
            }
        }
        !(inner.failure_rate() > 0.8 && inner.total_requests > 5)
    }

    /// Snapshot metrics.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let window = Duration::from_millis(self.config.monitoring_window_ms);
        let mut inner = self.lock();
        inner.prune(Instant::now(), window);

        let average_response_time_ms = if inner.response_times.is_empty() {
            0.0
        } else {
            let total: f64 = inner.response_times.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            total / inner.response_times.len() as f64
        };

        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            failure_rate: inner.failure_rate(),
            average_response_time_ms,
            last_failure_time: inner.last_failure,
            last_success_time: inner.last_success,
            opened_at: inner.opened_at_wall,
            state_changes: inner.state_changes,
            time_in_current_state_ms: inner.state_changed_at.elapsed().as_millis() as u64,
        }
    }

    /// Force a state for manual intervention.
    pub fn force_state(&self, state: CircuitState) {
        let change = {
            let mut inner = self.lock();
            tracing::warn!(breaker = %self.name, from = %inner.state, to = %state, "Forcing circuit breaker state");
            let change = self.transition(&mut inner, state);
            if state == CircuitState::Closed {
                inner.reset_counters();
            }
            change
        };
        self.notify(change);
    }

    /// Return to the initial closed state and drop all samples.
    pub fn reset(&self) {
        let change = {
            let mut inner = self.lock();
            tracing::info!(breaker = %self.name, "Resetting circuit breaker");
            let change = self.transition(&mut inner, CircuitState::Closed);
            inner.reset_counters();
            inner.recent.clear();
            inner.response_times.clear();
            change
        };
        self.notify(change);
    }
}

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Payment operation:
//!     → retries.rs (attempt, classify failure, back off, try again)
//!         → circuit_breaker.rs (fail fast / fallback while open)
//!             → timeouts.rs (per-call deadline)
//!                 → provider call
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every provider call has a deadline
//! - The retry predicate belongs to the caller; this layer only counts
//! - State lives behind plain mutexes that are never held across awaits

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffStrategy;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitState, CircuitStateChange, OperationResult, StateListener,
};
pub use retries::{FailureListener, OperationFailed, RetryCondition, RetryHandler, RetryMetrics, RetryResult};
pub use timeouts::ResilienceError;

/// Short label describing an error, used for the retry error-type breakdown.
pub trait FailureKind {
    fn failure_kind(&self) -> &str;
}

//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Payment service, breaker, retry handler produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON or pretty)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Transaction ids travel as a structured field on every payment log line
//! - Metrics are cheap (atomic increments) and safe to call before init

pub mod logging;
pub mod metrics;

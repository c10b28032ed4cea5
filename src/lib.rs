//! Resilient payment processing library.
//!
//! Wraps a Stripe-shaped payment provider with a circuit breaker, a retry
//! handler, a bounded transaction log, a recovery sweep and event emission.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod payments;
pub mod provider;
pub mod resilience;

pub use config::schema::PaymentsConfig;
pub use lifecycle::Shutdown;
pub use payments::{EventBus, PaymentEvent, ResilientPaymentService};
pub use provider::{PaymentProvider, StripeProvider};

//! Payment subsystem.
//!
//! # Data Flow
//! ```text
//! caller
//!     → service.rs (transaction id, validation.rs, audit entry)
//!         → resilience (retry → breaker → timeout)
//!             → provider (Stripe, or the fallback while open)
//!     → transaction_log.rs (terminal entry)
//!     → events.rs (broadcast to subscribers)
//!
//! recovery.rs
//!     → scans transaction_log.rs for recent failures → replays via service.rs
//! ```
//!
//! # Design Decisions
//! - Callers get flat responses; `PaymentError` stays inside the crate boundary
//! - Retry eligibility (classify.rs) is decided by error kind, not by HTTP status
//! - Idempotency keys are transaction ids, so a retried create never double-charges

pub mod classify;
pub mod error;
pub mod events;
pub mod recovery;
pub mod service;
pub mod transaction_log;
pub mod types;
pub mod validation;

pub use classify::should_retry_payment;
pub use error::PaymentError;
pub use events::{EventBus, PaymentEvent};
pub use service::{generate_transaction_id, ResilientPaymentService};
pub use transaction_log::{TransactionLog, TransactionLogEntry};
pub use types::{
    Address, BankAccountDetails, BillingDetails, CardDetails, CustomerRequest, CustomerResponse, HealthMetrics,
    PaymentMethodDetails, PaymentMethodRequest, PaymentMethodResponse, PaymentRequest, PaymentResponse,
    RecoverySummary, RefundReason, RefundRequest, RefundResponse,
};

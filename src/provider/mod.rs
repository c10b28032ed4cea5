//! Payment provider abstraction.
//!
//! # Data Flow
//! ```text
//! ResilientPaymentService
//!     → PaymentProvider (trait object)
//!         → stripe.rs (HTTP, form-encoded, bearer auth)
//!         → mock.rs   (fallback while the circuit is open, opt-in)
//! ```
//!
//! # Design Decisions
//! - Providers return raw provider objects; normalization happens in the service
//! - Mutating calls carry an idempotency key so retries never double-charge

pub mod mock;
pub mod stripe;
pub mod types;

use async_trait::async_trait;

use crate::payments::{CustomerRequest, PaymentError, PaymentMethodRequest, PaymentRequest, RefundRequest};

pub use mock::MockFallbackProvider;
pub use stripe::StripeProvider;
pub use types::{BankAccountSummary, CardSummary, Customer, IntentStatus, PaymentIntent, PaymentMethod, Refund};

/// Per-operation context passed to every mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Transaction id of the service operation, stamped into provider metadata.
    pub transaction_id: String,
    /// Sent as `Idempotency-Key`; identical across retries of one operation.
    pub idempotency_key: String,
}

impl CallContext {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        let transaction_id = transaction_id.into();
        Self {
            idempotency_key: transaction_id.clone(),
            transaction_id,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }
}

/// A remote payment processor.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Name reported in responses (`"stripe"`, `"mock-fallback"`).
    fn name(&self) -> &'static str;

    async fn create_payment_intent(
        &self,
        request: &PaymentRequest,
        ctx: &CallContext,
    ) -> Result<PaymentIntent, PaymentError>;

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        payment_method_id: Option<&str>,
        ctx: &CallContext,
    ) -> Result<PaymentIntent, PaymentError>;

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    async fn create_customer(&self, request: &CustomerRequest, ctx: &CallContext) -> Result<Customer, PaymentError>;

    async fn create_refund(&self, request: &RefundRequest, ctx: &CallContext) -> Result<Refund, PaymentError>;

    async fn create_payment_method(
        &self,
        request: &PaymentMethodRequest,
        ctx: &CallContext,
    ) -> Result<PaymentMethod, PaymentError>;

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
        ctx: &CallContext,
    ) -> Result<PaymentMethod, PaymentError>;
}

//! Mock fallback provider.
//!
//! Served only while the circuit is open and only when `fallback.mode = "mock"`.
//! Nothing is charged: every object is synthetic, ids are `mock_`-prefixed and
//! intents stay in `requires_payment_method`.

use async_trait::async_trait;
use uuid::Uuid;

use super::types::{CardSummary, Customer, IntentStatus, PaymentIntent, PaymentMethod, Refund};
use super::{CallContext, PaymentProvider};
use crate::payments::{CustomerRequest, PaymentError, PaymentMethodDetails, PaymentMethodRequest, PaymentRequest, RefundRequest};

pub const MOCK_PROVIDER_NAME: &str = "mock-fallback";

#[derive(Debug, Default, Clone)]
pub struct MockFallbackProvider;

impl MockFallbackProvider {
    pub fn new() -> Self {
        Self
    }
}

fn mock_id(prefix: &str) -> String {
    format!("mock_{}_{}", prefix, Uuid::new_v4().simple())
}

fn mock_intent(id: String, amount: i64, currency: &str) -> PaymentIntent {
    PaymentIntent {
        client_secret: Some(format!("{id}_secret_mock")),
        id,
        status: IntentStatus::RequiresPaymentMethod,
        amount,
        currency: currency.to_lowercase(),
    }
}

#[async_trait]
impl PaymentProvider for MockFallbackProvider {
    fn name(&self) -> &'static str {
        MOCK_PROVIDER_NAME
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentRequest,
        ctx: &CallContext,
    ) -> Result<PaymentIntent, PaymentError> {
        tracing::warn!(transaction_id = %ctx.transaction_id, "Serving mock payment intent; nothing was charged");
        Ok(mock_intent(mock_id("pi"), request.amount, &request.currency))
    }

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        _payment_method_id: Option<&str>,
        ctx: &CallContext,
    ) -> Result<PaymentIntent, PaymentError> {
        tracing::warn!(transaction_id = %ctx.transaction_id, intent_id, "Serving mock confirmation; nothing was charged");
        Ok(mock_intent(intent_id.to_string(), 0, ""))
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        tracing::warn!(intent_id, "Serving mock payment intent status");
        Ok(mock_intent(intent_id.to_string(), 0, ""))
    }

    async fn create_customer(&self, _request: &CustomerRequest, ctx: &CallContext) -> Result<Customer, PaymentError> {
        tracing::warn!(transaction_id = %ctx.transaction_id, "Serving mock customer");
        Ok(Customer {
            id: mock_id("cus"),
            email: None,
        })
    }

    async fn create_refund(&self, request: &RefundRequest, ctx: &CallContext) -> Result<Refund, PaymentError> {
        tracing::warn!(transaction_id = %ctx.transaction_id, "Serving mock refund; nothing was refunded");
        Ok(Refund {
            id: mock_id("re"),
            status: Some("pending".to_string()),
            amount: request.amount.unwrap_or(0),
            payment_intent: Some(request.payment_intent_id.clone()),
        })
    }

    async fn create_payment_method(
        &self,
        request: &PaymentMethodRequest,
        ctx: &CallContext,
    ) -> Result<PaymentMethod, PaymentError> {
        tracing::warn!(transaction_id = %ctx.transaction_id, "Serving mock payment method");
        let card = match &request.details {
            PaymentMethodDetails::Card(_) => Some(CardSummary {
                brand: None,
                last4: Some(request.details.last4()),
            }),
            PaymentMethodDetails::BankAccount(_) => None,
        };
        Ok(PaymentMethod {
            id: mock_id("pm"),
            customer: None,
            card,
            us_bank_account: None,
        })
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
        ctx: &CallContext,
    ) -> Result<PaymentMethod, PaymentError> {
        tracing::warn!(transaction_id = %ctx.transaction_id, payment_method_id, "Serving mock attachment");
        Ok(PaymentMethod {
            id: payment_method_id.to_string(),
            customer: Some(customer_id.to_string()),
            card: None,
            us_bank_account: None,
        })
    }
}

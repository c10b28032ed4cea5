//! Request and response model of the payment service.
//!
//! Responses are flat and serializable so they can be published as events and
//! returned over the admin API unchanged.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::{IntentStatus, PaymentIntent};
use crate::resilience::{CircuitBreakerMetrics, RetryMetrics};

/// Input to `create_payment_intent`. `amount` is in minor currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: i64,
    pub currency: String,
    pub description: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub setup_future_usage: bool,
}

impl PaymentRequest {
    pub fn new(amount: i64, currency: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            description: description.into(),
            customer_id: None,
            payment_method_id: None,
            metadata: HashMap::new(),
            setup_future_usage: false,
        }
    }
}

/// Normalized outcome of a payment intent operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IntentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub requires_action: bool,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentResponse {
    pub fn succeeded(
        intent: &PaymentIntent,
        transaction_id: Option<String>,
        provider: &str,
        fallback_used: bool,
    ) -> Self {
        Self {
            success: true,
            payment_intent_id: Some(intent.id.clone()),
            client_secret: intent.client_secret.clone(),
            status: Some(intent.status),
            transaction_id,
            requires_action: intent.status == IntentStatus::RequiresAction,
            fallback_used,
            provider: Some(provider.to_string()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, transaction_id: Option<String>) -> Self {
        Self {
            success: false,
            payment_intent_id: None,
            client_secret: None,
            status: None,
            transaction_id,
            requires_action: false,
            fallback_used: false,
            provider: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CustomerRequest {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            phone: None,
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CustomerResponse {
    pub fn succeeded(customer_id: String, transaction_id: String, fallback_used: bool) -> Self {
        Self {
            success: true,
            customer_id: Some(customer_id),
            transaction_id: Some(transaction_id),
            fallback_used,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, transaction_id: String) -> Self {
        Self {
            success: false,
            customer_id: None,
            transaction_id: Some(transaction_id),
            fallback_used: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    Duplicate,
    Fraudulent,
    RequestedByCustomer,
}

impl RefundReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundReason::Duplicate => "duplicate",
            RefundReason::Fraudulent => "fraudulent",
            RefundReason::RequestedByCustomer => "requested_by_customer",
        }
    }
}

/// Refund request. Without `amount` the whole payment is refunded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_intent_id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub reason: Option<RefundReason>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RefundRequest {
    pub fn full(payment_intent_id: impl Into<String>) -> Self {
        Self {
            payment_intent_id: payment_intent_id.into(),
            amount: None,
            reason: None,
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefundResponse {
    pub fn failed(error: impl Into<String>, transaction_id: String) -> Self {
        Self {
            success: false,
            refund_id: None,
            status: None,
            amount: None,
            transaction_id: Some(transaction_id),
            fallback_used: false,
            error: Some(error.into()),
        }
    }
}

/// Raw card details. Only ever forwarded to the provider; `Debug` is redacted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub cvc: String,
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("last4", &last4(&self.number))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccountDetails {
    pub account_holder_name: String,
    pub routing_number: String,
    pub account_number: String,
    #[serde(default)]
    pub account_holder_type: Option<String>,
}

impl fmt::Debug for BankAccountDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankAccountDetails")
            .field("account_holder_name", &self.account_holder_name)
            .field("last4", &last4(&self.account_number))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethodDetails {
    Card(CardDetails),
    BankAccount(BankAccountDetails),
}

impl PaymentMethodDetails {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentMethodDetails::Card(_) => "card",
            PaymentMethodDetails::BankAccount(_) => "bank_account",
        }
    }

    pub fn last4(&self) -> String {
        match self {
            PaymentMethodDetails::Card(card) => last4(&card.number),
            PaymentMethodDetails::BankAccount(bank) => last4(&bank.account_number),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodRequest {
    pub customer_id: String,
    pub details: PaymentMethodDetails,
    #[serde(default)]
    pub billing_details: Option<BillingDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentMethodResponse {
    pub fn failed(error: impl Into<String>, transaction_id: String) -> Self {
        Self {
            success: false,
            payment_method_id: None,
            last4: None,
            brand: None,
            transaction_id: Some(transaction_id),
            fallback_used: false,
            error: Some(error.into()),
        }
    }
}

/// Result of a recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub recovered: usize,
    pub failed: usize,
}

/// Health snapshot of the service.
#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    pub circuit_breaker: CircuitBreakerMetrics,
    pub retry_handler: RetryMetrics,
    pub transaction_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

fn last4(digits: &str) -> String {
    let chars: Vec<char> = digits.chars().filter(|c| !c.is_whitespace()).collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

//! Provider-side objects, in the minimal shape the service needs.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    /// Any status this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Unknown => "unknown",
        }
    }
}

/// A payment intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
}

/// A customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

/// Display-safe card summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSummary {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
}

/// A stored payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub card: Option<CardSummary>,
    #[serde(default)]
    pub us_bank_account: Option<BankAccountSummary>,
}

/// Display-safe bank account summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccountSummary {
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
}

impl PaymentMethod {
    pub fn last4(&self) -> Option<String> {
        self.card
            .as_ref()
            .and_then(|c| c.last4.clone())
            .or_else(|| self.us_bank_account.as_ref().and_then(|b| b.last4.clone()))
    }

    pub fn brand(&self) -> Option<String> {
        self.card
            .as_ref()
            .and_then(|c| c.brand.clone())
            .or_else(|| self.us_bank_account.as_ref().and_then(|b| b.bank_name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_does_not_fail_decoding() {
        let intent: PaymentIntent =
            serde_json::from_str(r#"{"id":"pi_1","status":"something_new"}"#).unwrap();
        assert_eq!(intent.status, IntentStatus::Unknown);
        assert_eq!(intent.client_secret, None);
    }

    #[test]
    fn test_payment_method_display_fields() {
        let pm: PaymentMethod = serde_json::from_str(
            r#"{"id":"pm_1","card":{"brand":"visa","last4":"4242","exp_month":12}}"#,
        )
        .unwrap();
        assert_eq!(pm.last4().as_deref(), Some("4242"));
        assert_eq!(pm.brand().as_deref(), Some("visa"));
    }
}

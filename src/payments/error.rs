//! Payment error type.

use thiserror::Error;

use crate::resilience::{FailureKind, ResilienceError};

/// Errors that can occur while talking to the payment provider.
///
/// Callers of the service never see this type directly; it is flattened into
/// the `error` string of the response at the service boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    /// The provider answered with an error, or could not be reached.
    ///
    /// `error_type` carries the normalized kind (`card_declined`,
    /// `rate_limit`, `api_connection_error`...) when one is known.
    #[error("{message}")]
    Provider {
        error_type: Option<String>,
        message: String,
    },

    /// Timeout or open circuit.
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    /// Request rejected before reaching the provider.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The provider answered with something we could not parse.
    #[error("Malformed provider response: {0}")]
    Decode(String),
}

impl PaymentError {
    pub fn provider(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::Provider {
            error_type: Some(error_type.into()),
            message: message.into(),
        }
    }

    pub fn untyped(message: impl Into<String>) -> Self {
        PaymentError::Provider {
            error_type: None,
            message: message.into(),
        }
    }

    /// Provider-reported error kind, if any.
    pub fn error_type(&self) -> Option<&str> {
        match self {
            PaymentError::Provider { error_type, .. } => error_type.as_deref(),
            _ => None,
        }
    }
}

impl FailureKind for PaymentError {
    fn failure_kind(&self) -> &str {
        match self {
            PaymentError::Provider { error_type: Some(t), .. } => t,
            PaymentError::Provider { error_type: None, .. } => "provider_error",
            PaymentError::Resilience(ResilienceError::Timeout(_)) => "timeout",
            PaymentError::Resilience(ResilienceError::CircuitOpen(_)) => "circuit_open",
            PaymentError::Validation(_) => "validation",
            PaymentError::Decode(_) => "decode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_kind() {
        let err = PaymentError::provider("card_declined", "Your card was declined.");
        assert_eq!(err.to_string(), "Your card was declined.");
        assert_eq!(err.error_type(), Some("card_declined"));
        assert_eq!(err.failure_kind(), "card_declined");

        let err: PaymentError = ResilienceError::Timeout(30_000).into();
        assert_eq!(err.to_string(), "Operation timed out after 30000ms");
        assert_eq!(err.failure_kind(), "timeout");
        assert_eq!(err.error_type(), None);
    }
}

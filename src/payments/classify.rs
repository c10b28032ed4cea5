//! Retry eligibility for payment errors.

use super::error::PaymentError;

const RETRYABLE: &[&str] = &[
    "network_error",
    "api_connection_error",
    "rate_limit",
    "temporary_failure",
];

const NON_RETRYABLE: &[&str] = &[
    "authentication_required",
    "card_declined",
    "insufficient_funds",
    "invalid_request",
];

/// Decide whether a failed provider call may be attempted again.
///
/// A typed error kind in either list decides on its own. Otherwise the
/// lower-cased message must mention a retryable kind and no non-retryable one.
pub fn should_retry_payment(error: &PaymentError) -> bool {
    if let Some(kind) = error.error_type() {
        if NON_RETRYABLE.contains(&kind) {
            return false;
        }
        if RETRYABLE.contains(&kind) {
            return true;
        }
    }

    let message = error.to_string().to_lowercase();
    let retryable = RETRYABLE.iter().any(|p| message.contains(p));
    let non_retryable = NON_RETRYABLE.iter().any(|p| message.contains(p));
    retryable && !non_retryable
}

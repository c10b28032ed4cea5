//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and relationships
//! between fields. All problems are reported, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{PaymentsConfig, PLACEHOLDER_ADMIN_KEY};

/// Longest recovery window accepted: one year.
pub const MAX_RECOVERY_LOOKBACK_SECS: u64 = 365 * 24 * 60 * 60;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &PaymentsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if url::Url::parse(&config.provider.api_base_url).is_err() {
        errors.push(ValidationError::new("provider.api_base_url", "must be an absolute URL"));
    }
    if config.provider.api_key_env.trim().is_empty() {
        errors.push(ValidationError::new("provider.api_key_env", "must name an environment variable"));
    }
    if config.provider.request_timeout_secs == 0 {
        errors.push(ValidationError::new("provider.request_timeout_secs", "must be > 0"));
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be > 0"));
    }
    if cb.success_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.success_threshold", "must be > 0"));
    }
    if cb.execution_timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.execution_timeout_ms", "must be > 0"));
    }

    let r = &config.retries;
    if r.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be > 0"));
    }
    if r.initial_delay_ms > r.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.initial_delay_ms",
            format!("{} exceeds max_delay_ms {}", r.initial_delay_ms, r.max_delay_ms),
        ));
    }
    if !(r.backoff_factor.is_finite() && r.backoff_factor >= 1.0) {
        errors.push(ValidationError::new("retries.backoff_factor", "must be >= 1.0"));
    }

    let log = &config.transaction_log;
    if log.retain_entries == 0 || log.retain_entries >= log.max_entries {
        errors.push(ValidationError::new(
            "transaction_log.retain_entries",
            format!("must be in 1..{}", log.max_entries),
        ));
    }
    if log.recovery_lookback_secs == 0 || log.recovery_lookback_secs > MAX_RECOVERY_LOOKBACK_SECS {
        errors.push(ValidationError::new(
            "transaction_log.recovery_lookback_secs",
            format!("must be in 1..={MAX_RECOVERY_LOOKBACK_SECS}"),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be host:port"));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "must be host:port"));
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        } else if config.admin.api_key == PLACEHOLDER_ADMIN_KEY {
            errors.push(ValidationError::new("admin.api_key", "must be changed from the shipped placeholder"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

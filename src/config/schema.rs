//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the payment
//! service. All types derive Serde traits for deserialization from TOML, and
//! every section has defaults so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::resilience::BackoffStrategy;

/// Root configuration for the payment service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PaymentsConfig {
    /// Remote payment provider settings.
    pub provider: ProviderConfig,

    /// Circuit breaker guarding the provider.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// In-memory audit log bounds and recovery window.
    pub transaction_log: TransactionLogConfig,

    /// Degraded path used while the circuit is open.
    pub fallback: FallbackConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Payment provider connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the provider REST API.
    pub api_base_url: String,

    /// Name of the environment variable holding the secret API key.
    pub api_key_env: String,

    /// Provider API version header value.
    pub api_version: String,

    /// Transport-level timeout for a single HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stripe.com".to_string(),
            api_key_env: "STRIPE_SECRET_KEY".to_string(),
            api_version: "2023-10-16".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,

    /// Cool-down before a half-open trial is allowed (ms).
    pub timeout_ms: u64,

    /// Deadline for a single protected call (ms).
    pub execution_timeout_ms: u64,

    /// Window used for the reported failure rate (ms).
    pub monitoring_window_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout_ms: 60_000,
            execution_timeout_ms: 30_000,
            monitoring_window_ms: 300_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt (ms).
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (ms).
    pub max_delay_ms: u64,

    /// Delay growth strategy.
    pub strategy: BackoffStrategy,

    /// Spread delays by ±10%.
    pub jitter: bool,

    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,

    /// Bound on the whole retry sequence (ms). `None` or 0 disables it.
    pub timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            backoff_factor: 2.0,
            timeout_ms: Some(30_000),
        }
    }
}

/// Transaction log bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionLogConfig {
    /// Size above which eviction kicks in.
    pub max_entries: usize,

    /// Entries kept after eviction (newest first).
    pub retain_entries: usize,

    /// How far back the recovery sweep looks (seconds).
    pub recovery_lookback_secs: u64,
}

impl Default for TransactionLogConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            retain_entries: 5_000,
            recovery_lookback_secs: 24 * 60 * 60,
        }
    }
}

/// Which fallback serves calls while the circuit is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Open circuit fails fast.
    #[default]
    None,
    /// Synthetic mock objects. Never use where real money moves.
    Mock,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FallbackConfig {
    pub mode: FallbackMode,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Shipped default key. Rejected by validation when the admin API is enabled.
pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PaymentsConfig (validated, immutable)
//!
//! provider secret
//!     → loader.rs reads the env var named by provider.api_key_env
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Secrets come from the environment only

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_api_key, load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CircuitBreakerConfig, FallbackConfig, FallbackMode, LogFormat,
    ObservabilityConfig, PaymentsConfig, ProviderConfig, RetryConfig, TransactionLogConfig,
};

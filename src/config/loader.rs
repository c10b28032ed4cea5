//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{PaymentsConfig, ProviderConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("{0} environment variable is required")]
    MissingSecret(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<PaymentsConfig, ConfigError> {
    let config: PaymentsConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PaymentsConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Read the provider secret from the environment variable named in config.
///
/// The key never lives in the config file.
pub fn load_api_key(provider: &ProviderConfig) -> Result<String, ConfigError> {
    match std::env::var(&provider.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::MissingSecret(provider.api_key_env.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_invalid_values() {
        let err = parse_config("[retries]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("retries.max_attempts"));
    }

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = parse_config("[retries]\nmax_attempts = 0\n[circuit_breaker]\nsuccess_threshold = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: circuit_breaker.success_threshold: must be > 0, retries.max_attempts: must be > 0"
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("payments-missing-{}.toml", uuid::Uuid::new_v4()));
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().starts_with("IO error: "));
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = parse_config("[retries\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_secret() {
        let provider = ProviderConfig {
            api_key_env: "RESILIENT_PAYMENTS_TEST_UNSET_KEY".to_string(),
            ..ProviderConfig::default()
        };
        let err = load_api_key(&provider).unwrap_err();
        assert_eq!(
            err.to_string(),
            "RESILIENT_PAYMENTS_TEST_UNSET_KEY environment variable is required"
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("payments-config-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[circuit_breaker]\nfailure_threshold = 2\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.circuit_breaker.failure_threshold, 2);
        fs::remove_file(&path).unwrap_or_default();
    }
}

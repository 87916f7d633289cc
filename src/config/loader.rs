//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
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
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::CodecStrategy;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.codec.strategy, CodecStrategy::Direct);
        assert_eq!(config.sessions.ttl_secs, 3600);
        assert_eq!(config.upstream.max_redirects, 10);
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
            [codec]
            strategy = "session"

            [sessions]
            capacity = 5
            ttl_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.codec.strategy, CodecStrategy::Session);
        assert_eq!(config.codec.navigation_prefix, "/proxy/");
        assert_eq!(config.sessions.capacity, 5);
        assert_eq!(config.sessions.ttl_secs, 120);
        assert_eq!(config.sessions.id_length, 16);
    }

    #[test]
    fn test_invalid_config_reports_all_errors() {
        let err = parse_config(
            r#"
            [sessions]
            capacity = 0
            ttl_secs = 0
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert!(errors.len() >= 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let err = parse_config("[codec]\nstrategy = \"cookie\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

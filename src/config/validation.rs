//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, capacities > 0)
//! - Check route prefixes are well-formed and distinct
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// Prefixes owned by built-in endpoints.
const RESERVED_PREFIXES: &[&str] = &["/api/", "/render/"];

/// A single semantic configuration problem.
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
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }
    if let Some(public) = &config.listener.public_base_url {
        match Url::parse(public) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.path() == "/" => {}
            _ => errors.push(ValidationError::new(
                "listener.public_base_url",
                "must be an http(s) origin without a path",
            )),
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be > 0"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be > 0"));
    }
    if config.timeouts.request_secs <= config.timeouts.upstream_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be greater than timeouts.upstream_secs",
        ));
    }

    if config.upstream.max_response_bytes == 0 {
        errors.push(ValidationError::new("upstream.max_response_bytes", "must be > 0"));
    }
    if config
        .upstream
        .forward_headers
        .iter()
        .any(|h| h.eq_ignore_ascii_case("host"))
    {
        errors.push(ValidationError::new(
            "upstream.forward_headers",
            "the Host header is never forwarded",
        ));
    }

    if config.sessions.capacity == 0 {
        errors.push(ValidationError::new("sessions.capacity", "must be > 0"));
    }
    if config.sessions.ttl_secs == 0 {
        errors.push(ValidationError::new("sessions.ttl_secs", "must be > 0"));
    }
    if config.sessions.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("sessions.sweep_interval_secs", "must be > 0"));
    }
    if config.sessions.id_length < 8 {
        errors.push(ValidationError::new("sessions.id_length", "must be >= 8"));
    }

    for (field, prefix) in [
        ("codec.navigation_prefix", &config.codec.navigation_prefix),
        ("codec.asset_prefix", &config.codec.asset_prefix),
    ] {
        let well_formed = prefix.len() > 2
            && prefix.starts_with('/')
            && prefix.ends_with('/')
            && prefix[1..prefix.len() - 1]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            errors.push(ValidationError::new(
                field,
                format!("must look like \"/name/\", got {prefix:?}"),
            ));
        } else if RESERVED_PREFIXES.contains(&prefix.as_str()) {
            errors.push(ValidationError::new(
                field,
                format!("{prefix:?} is used by a built-in endpoint"),
            ));
        }
    }
    if config.codec.navigation_prefix == config.codec.asset_prefix {
        errors.push(ValidationError::new(
            "codec.asset_prefix",
            "must differ from codec.navigation_prefix",
        ));
    }

    if config.render.enabled {
        if Url::parse(&config.render.endpoint).is_err() {
            errors.push(ValidationError::new("render.endpoint", "not a valid URL"));
        }
        if config.render.timeout_secs == 0 {
            errors.push(ValidationError::new("render.timeout_secs", "must be > 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

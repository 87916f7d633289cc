//! Reference resolution against a document base URL.
//!
//! # Responsibilities
//! - Turn relative, protocol-relative and absolute references into absolute URLs
//! - Classify references that must never be proxied (`data:`, `javascript:`, ...)
//! - Validate user-supplied target URLs

use thiserror::Error;
use url::Url;

use crate::error::{ProxyError, ProxyResult};

/// Schemes left untouched by the rewriters.
const SKIPPED_SCHEMES: &[&str] = &["data:", "blob:", "javascript:", "mailto:", "tel:", "about:"];

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An absolute http(s) URL to route through the proxy.
    Absolute(Url),
    /// Leave the reference exactly as it is.
    Skip,
}

/// A reference that cannot be resolved to a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid reference {reference:?}: {reason}")]
pub struct InvalidReference {
    pub reference: String,
    pub reason: String,
}

/// Resolve `reference` against `base`.
pub fn resolve(reference: &str, base: &Url) -> Result<Resolution, InvalidReference> {
    let trimmed = reference.trim_matches(|c: char| c.is_ascii_whitespace());
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(Resolution::Skip);
    }

    let lower_head: String = trimmed
        .chars()
        .take(12)
        .collect::<String>()
        .to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|s| lower_head.starts_with(s)) {
        return Ok(Resolution::Skip);
    }

    let resolved = base.join(trimmed).map_err(|e| InvalidReference {
        reference: reference.to_string(),
        reason: e.to_string(),
    })?;

    match resolved.scheme() {
        "http" | "https" if resolved.host_str().is_some() => Ok(Resolution::Absolute(resolved)),
        "http" | "https" => Err(InvalidReference {
            reference: reference.to_string(),
            reason: "missing host".to_string(),
        }),
        // Other schemes (ftp:, sms:, intent:, ...) are not fetchable through the proxy.
        _ => Ok(Resolution::Skip),
    }
}

/// Validate a target URL typed by a user or passed to the API.
///
/// Adds `https://` when no scheme is present.
pub fn parse_target(input: &str) -> ProxyResult<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ProxyError::InvalidUrl("no URL provided".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ProxyError::InvalidUrl(format!("{trimmed}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::InvalidUrl(format!(
            "unsupported scheme {:?}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ProxyError::InvalidUrl(format!("{trimmed}: missing host")));
    }
    Ok(url)
}

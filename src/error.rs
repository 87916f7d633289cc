//! Proxy error taxonomy.
//!
//! Every failure a caller can observe maps to one variant here. Reference and
//! document level rewrite failures never reach this type; they are absorbed
//! inside the `rewrite` subsystem.

use axum::http::StatusCode;
use thiserror::Error;

/// Category of an outbound fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// DNS resolution or TCP connect failed.
    Connect,
    /// The origin did not answer within the upstream timeout.
    Timeout,
    /// TLS handshake or certificate validation failed.
    Tls,
    /// Redirect chain exceeded the configured bound.
    TooManyRedirects,
    /// The response body could not be read or was too large.
    Body,
    /// Anything else reported by the HTTP client.
    Other,
}

impl FetchErrorKind {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Connect => "connect",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Tls => "tls",
            FetchErrorKind::TooManyRedirects => "redirects",
            FetchErrorKind::Body => "body",
            FetchErrorKind::Other => "other",
        }
    }
}

/// Errors surfaced by the proxy to its callers.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed target URL or disallowed scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Inbound request could not be read (oversized or broken body).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown or expired session identifier.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No proxy route for the requested path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network, timeout or TLS failure while reaching the origin.
    #[error("Failed to fetch {url}: {message}")]
    Fetch {
        kind: FetchErrorKind,
        url: String,
        message: String,
    },

    /// The render collaborator failed or timed out.
    #[error("Render failed for {url}: {message}")]
    Render { url: String, message: String },

    /// Unexpected internal failure (client construction, startup).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status this error is surfaced with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidUrl(_) | ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::SessionNotFound(_) | ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Fetch { kind: FetchErrorKind::Timeout, .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Fetch { .. } | ProxyError::Render { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Target URL the failure relates to, if any.
    pub fn target_url(&self) -> Option<&str> {
        match self {
            ProxyError::Fetch { url, .. } | ProxyError::Render { url, .. } => Some(url),
            _ => None,
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;

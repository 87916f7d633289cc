//! Request identification and origin derivation.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID for every inbound request
//! - Derive the public origin used in rewritten URLs
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A client-supplied `x-request-id` is kept

use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::Request;
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::config::ListenerConfig;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Request ID of an inbound request, `"unknown"` when absent.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Public origin of the proxy as seen by the client, without trailing slash.
///
/// A configured public URL wins. Otherwise the `Host` header is used, or the
/// forwarded host/proto headers when the listener trusts them. Empty when
/// nothing is known, which makes rewritten URLs root-relative.
pub fn proxy_base(headers: &HeaderMap, listener: &ListenerConfig) -> String {
    if let Some(base) = &listener.public_base_url {
        return base.trim_end_matches('/').to_string();
    }

    let forwarded = |name: &str| {
        listener
            .trust_forwarded_headers
            .then(|| headers.get(name))
            .flatten()
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or_default().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let host = forwarded("x-forwarded-host").or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    });

    let Some(host) = host else {
        return String::new();
    };

    let scheme = forwarded("x-forwarded-proto")
        .map(|s| s.to_ascii_lowercase())
        .filter(|s| s == "http" || s == "https")
        .unwrap_or_else(|| "http".to_string());

    format!("{scheme}://{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_base_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:8080"));
        let listener = ListenerConfig {
            public_base_url: Some("https://proxy.example.net/".into()),
            ..ListenerConfig::default()
        };
        assert_eq!(proxy_base(&headers, &listener), "https://proxy.example.net");
    }

    #[test]
    fn test_base_from_host() {
        let listener = ListenerConfig::default();
        let mut headers = HeaderMap::new();
        assert_eq!(proxy_base(&headers, &listener), "");

        headers.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        assert_eq!(proxy_base(&headers, &listener), "http://localhost:8080");
    }

    #[test]
    fn test_forwarded_headers_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("evil.example"));

        let listener = ListenerConfig::default();
        assert_eq!(proxy_base(&headers, &listener), "http://localhost:8080");

        let trusting = ListenerConfig {
            trust_forwarded_headers: true,
            ..ListenerConfig::default()
        };
        assert_eq!(proxy_base(&headers, &trusting), "https://evil.example");
    }

    #[test]
    fn test_make_request_id() {
        let request = Request::new(());
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(value).is_ok());
    }

    #[test]
    fn test_request_id_fallback() {
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
    }
}

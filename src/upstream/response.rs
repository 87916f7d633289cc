//! Origin responses and header relay rules.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use bytes::Bytes;
use url::Url;

/// A fully received origin response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub content_type: Option<String>,
    /// URL after following redirects.
    pub final_url: Url,
}

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

const DROPPED: &[&str] = &[
    "content-length",
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "strict-transport-security",
    "cache-control",
    "expires",
    "pragma",
    "location",
];

fn is_hop_by_hop(name: &str, connection_tokens: &[String]) -> bool {
    HOP_BY_HOP.contains(&name) || connection_tokens.iter().any(|t| t == name)
}

/// Filter origin response headers for relay to the client.
///
/// `keep_encoding` is true only when the body is relayed verbatim.
pub fn relay_headers(upstream: &HeaderMap, keep_encoding: bool) -> HeaderMap {
    let connection_tokens: Vec<String> = upstream
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut relayed = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        let lower = name.as_str();
        if is_hop_by_hop(lower, &connection_tokens)
            || DROPPED.contains(&lower)
            || lower.starts_with("access-control-")
            || (lower == "content-encoding" && !keep_encoding)
        {
            continue;
        }

        if *name == header::SET_COOKIE {
            if let Some(cookie) = value.to_str().ok().map(strip_cookie_domain) {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    relayed.append(name.clone(), value);
                }
            }
            continue;
        }

        relayed.append(name.clone(), value.clone());
    }
    relayed
}

/// Remove the `Domain` attribute so the browser scopes the cookie to the proxy host.
pub fn strip_cookie_domain(cookie: &str) -> String {
    cookie
        .split(';')
        .enumerate()
        .filter(|(i, part)| {
            *i == 0
                || !part
                    .split('=')
                    .next()
                    .is_some_and(|attr| attr.trim().eq_ignore_ascii_case("domain"))
        })
        .map(|(_, part)| part)
        .collect::<Vec<_>>()
        .join(";")
}

/// Select the inbound headers that may be forwarded to the origin.
pub fn forward_headers(inbound: &HeaderMap, allow: &[String]) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for name in allow {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        if name == header::HOST {
            continue;
        }
        for value in inbound.get_all(&name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

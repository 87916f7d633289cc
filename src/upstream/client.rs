//! Outbound HTTP client.

use std::error::Error as _;
use std::time::Duration;

use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::Method;
use bytes::{Bytes, BytesMut};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::error::{FetchErrorKind, ProxyError, ProxyResult};
use crate::observability::metrics;
use crate::upstream::response::UpstreamResponse;

/// One outbound fetch.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub url: Url,
    /// Already filtered through the forward whitelist.
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Fetches origin resources on behalf of clients.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl Forwarder {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> ProxyResult<Self> {
        let mut defaults = HeaderMap::new();
        defaults.insert(header::ACCEPT, header_value(&upstream.accept)?);
        defaults.insert(header::ACCEPT_LANGUAGE, header_value(&upstream.accept_language)?);

        let client = reqwest::Client::builder()
            .user_agent(upstream.user_agent.clone())
            .default_headers(defaults)
            .redirect(Policy::limited(upstream.max_redirects))
            .no_proxy()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.upstream_secs))
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_response_bytes: upstream.max_response_bytes,
        })
    }

    /// Perform the fetch and read the whole body.
    pub async fn forward(&self, request: ForwardRequest) -> ProxyResult<UpstreamResponse> {
        let target = request.url.to_string();
        tracing::debug!(method = %request.method, url = %target, "Fetching origin");

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| fetch_error(&target, &e))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if response
            .content_length()
            .is_some_and(|len| len > self.max_response_bytes as u64)
        {
            return Err(too_large(&target, self.max_response_bytes));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_error(&target, &e))?
        {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(too_large(&target, self.max_response_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        if final_url.as_str() != target {
            tracing::debug!(from = %target, to = %final_url, "Followed redirects");
        }

        Ok(UpstreamResponse {
            status,
            headers,
            body: body.freeze(),
            content_type,
            final_url,
        })
    }
}

fn header_value(value: &str) -> ProxyResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ProxyError::Internal(format!("invalid default header {value:?}: {e}")))
}

fn too_large(url: &str, limit: usize) -> ProxyError {
    metrics::record_upstream_error(FetchErrorKind::Body.as_str());
    ProxyError::Fetch {
        kind: FetchErrorKind::Body,
        url: url.to_string(),
        message: format!("response body exceeds {limit} bytes"),
    }
}

fn fetch_error(url: &str, err: &reqwest::Error) -> ProxyError {
    let kind = classify_error(err);
    metrics::record_upstream_error(kind.as_str());
    tracing::warn!(url = %url, kind = kind.as_str(), error = %err, "Origin fetch failed");
    ProxyError::Fetch {
        kind,
        url: url.to_string(),
        message: error_chain(err),
    }
}

fn classify_error(err: &reqwest::Error) -> FetchErrorKind {
    if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if err.is_redirect() {
        FetchErrorKind::TooManyRedirects
    } else if looks_like_tls(err) {
        FetchErrorKind::Tls
    } else if err.is_connect() {
        FetchErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        FetchErrorKind::Body
    } else {
        FetchErrorKind::Other
    }
}

fn looks_like_tls(err: &reqwest::Error) -> bool {
    let chain = error_chain(err).to_ascii_lowercase();
    chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl")
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

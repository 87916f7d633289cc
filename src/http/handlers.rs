//! Request handlers.
//!
//! # Data Flow
//! ```text
//! /proxy/<path>, /asset/<path>
//!     → codec decode (session lookup when needed)
//!     → forwarder (whitelisted headers, body, redirects)
//!     → content rewriter (by content type)
//!     → header relay + cache policy → client
//! ```

use std::time::Instant;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CodecStrategy;
use crate::error::{ProxyError, ProxyResult};
use crate::http::error::ErrorResponse;
use crate::http::request::{proxy_base, request_id};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::render::RenderRequest;
use crate::rewrite::{ProxyReference, RewriteContext, UrlRewriter};
use crate::target::{append_query, parse_target, DecodedTarget, RouteKind};
use crate::upstream::{forward_headers, relay_headers, ForwardRequest};

/// Path prefix of the rendered-page endpoint.
pub const RENDER_PREFIX: &str = "/render/";

type HandlerResult = Result<Response, ErrorResponse>;

/// Turn a handler outcome into a response, recording metrics and logging failures.
fn finish(
    route: &'static str,
    method: &Method,
    headers: &HeaderMap,
    start: Instant,
    result: ProxyResult<Response>,
) -> HandlerResult {
    match result {
        Ok(response) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), route, start);
            Ok(response)
        }
        Err(error) => {
            let failure = ErrorResponse::new(error, headers);
            let status = failure.status();
            if status.is_server_error() {
                tracing::warn!(
                    request_id = %request_id(headers),
                    route = route,
                    status = status.as_u16(),
                    error = %failure.error,
                    "Request failed"
                );
            } else {
                tracing::debug!(
                    request_id = %request_id(headers),
                    route = route,
                    status = status.as_u16(),
                    error = %failure.error,
                    "Request rejected"
                );
            }
            metrics::record_request(method.as_str(), status.as_u16(), route, start);
            Err(failure)
        }
    }
}

/// `ANY /proxy/<path>` and `ANY /asset/<path>`.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> HandlerResult {
    let start = Instant::now();
    let method = request.method().clone();
    let headers = request.headers().clone();
    let result = proxy(&state, request).await;
    finish("proxy", &method, &headers, start, result)
}

async fn proxy(state: &AppState, request: Request<Body>) -> ProxyResult<Response> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();

    let (kind, rest) = state
        .codec
        .split_path(path)
        .ok_or_else(|| ProxyError::NotFound(path.to_string()))?;

    let decoded = decode_target(state, rest, parts.uri.query())?;

    tracing::debug!(
        request_id = %request_id(&parts.headers),
        method = %parts.method,
        route = kind.as_str(),
        target = %decoded.url,
        "Proxying request"
    );

    let body = to_bytes(body, state.config.listener.max_body_size)
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("unreadable request body: {e}")))?;

    let upstream = state
        .forwarder
        .forward(ForwardRequest {
            method: parts.method.clone(),
            url: decoded.url,
            headers: forward_headers(&parts.headers, &state.config.upstream.forward_headers),
            body,
        })
        .await?;

    let base = proxy_base(&parts.headers, &state.config.listener);
    let ctx = RewriteContext::new(upstream.final_url.clone(), base, decoded.session);

    let location = upstream
        .headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = state
        .rewriter
        .rewrite(upstream.body, upstream.content_type.as_deref(), &ctx);

    let mut response_headers = relay_headers(&upstream.headers, !outcome.rewritten);

    if let Some(location) = location {
        let rewriter = UrlRewriter::new(&state.codec, &ctx);
        let rewritten = rewriter
            .rewrite_from_document(ProxyReference::new("location", &location, RouteKind::Navigation))
            .unwrap_or(location);
        if let Ok(value) = HeaderValue::from_str(&rewritten) {
            response_headers.insert(header::LOCATION, value);
        }
    }

    apply_cache_policy(
        &mut response_headers,
        kind,
        upstream.status,
        state.config.cache.asset_max_age_secs,
    );

    let mut response = Response::new(Body::from(outcome.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

fn decode_target(state: &AppState, rest: &str, query: Option<&str>) -> ProxyResult<DecodedTarget> {
    let mut decoded = state.codec.decode(rest, &state.sessions)?;
    if let Some(scope) = &decoded.session {
        state.sessions.touch(&scope.id);
    }
    append_query(&mut decoded.url, query);
    Ok(decoded)
}

fn apply_cache_policy(headers: &mut HeaderMap, kind: RouteKind, status: StatusCode, max_age: u64) {
    match kind {
        RouteKind::Navigation => {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }
        RouteKind::Asset => {
            let policy = if status.is_success() {
                HeaderValue::from_str(&format!("public, max-age={max_age}"))
                    .unwrap_or_else(|_| HeaderValue::from_static("no-cache"))
            } else {
                HeaderValue::from_static("no-cache")
            };
            headers.insert(header::CACHE_CONTROL, policy);
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub target_url: String,
    pub proxy_path: String,
    pub expires_in_secs: u64,
}

/// `POST /api/create-session`.
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let start = Instant::now();
    let result = create(&state, &body);
    finish("create-session", &Method::POST, &headers, start, result)
}

fn create(state: &AppState, body: &[u8]) -> ProxyResult<Response> {
    if state.codec.strategy() != CodecStrategy::Session {
        return Err(ProxyError::InvalidRequest(
            "sessions are not used by the direct path strategy".to_string(),
        ));
    }

    let request: CreateSessionRequest = serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("expected {{\"url\": ...}}: {e}")))?;
    let target = parse_target(&request.url)?;
    let session = state.sessions.create_session(&target);

    tracing::info!(session_id = %session.id, target = %target, "Session created");

    let payload = CreateSessionResponse {
        proxy_path: state.codec.session_root(&session.id),
        session_id: session.id,
        target_url: target.to_string(),
        expires_in_secs: state.sessions.ttl().as_secs(),
    };
    Ok((StatusCode::CREATED, axum::Json(payload)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct BrowseParams {
    pub url: Option<String>,
}

/// `GET /browse?url=<target>`: redirect to the navigation proxy path.
pub async fn browse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BrowseParams>,
) -> HandlerResult {
    let start = Instant::now();
    let result = browse_target(&state, params.url.as_deref());
    finish("browse", &Method::GET, &headers, start, result)
}

fn browse_target(state: &AppState, url: Option<&str>) -> ProxyResult<Response> {
    let raw = url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ProxyError::InvalidUrl("missing url parameter".to_string()))?;
    let target = parse_target(raw)?;

    let location = match state.codec.strategy() {
        CodecStrategy::Direct => state.codec.encode(&target, RouteKind::Navigation, None)?,
        CodecStrategy::Session => {
            let session = state.sessions.create_session(&target);
            state.codec.session_root(&session.id)
        }
    };

    let mut response = StatusCode::SEE_OTHER.into_response();
    let value = HeaderValue::from_str(&location)
        .map_err(|e| ProxyError::Internal(format!("unrepresentable redirect: {e}")))?;
    response.headers_mut().insert(header::LOCATION, value);
    Ok(response)
}

/// `GET /render/<path>`: rendered and rewritten HTML.
pub async fn render_page(State(state): State<AppState>, request: Request<Body>) -> HandlerResult {
    let start = Instant::now();
    let method = request.method().clone();
    let headers = request.headers().clone();
    let result = render_document(&state, request).await;
    finish("render", &method, &headers, start, result)
}

async fn render_document(state: &AppState, request: Request<Body>) -> ProxyResult<Response> {
    let renderer = state
        .renderer
        .as_ref()
        .ok_or_else(|| ProxyError::NotFound("rendering is disabled".to_string()))?;

    let path = request.uri().path();
    let rest = path
        .strip_prefix(RENDER_PREFIX)
        .ok_or_else(|| ProxyError::NotFound(path.to_string()))?;
    let decoded = decode_target(state, rest, request.uri().query())?;

    let page = renderer
        .render(RenderRequest {
            url: decoded.url,
            wait: state.config.render.wait_until,
            timeout: state.render_timeout(),
            screenshot: false,
        })
        .await?;

    let base = proxy_base(request.headers(), &state.config.listener);
    let ctx = RewriteContext::new(page.final_url.clone(), base, decoded.session);
    let html = state
        .rewriter
        .rewrite_html_str(&page.html, &ctx)
        .unwrap_or_else(|e| {
            tracing::warn!(url = %page.final_url, error = %e, "Rewrite of rendered page failed");
            page.html.clone()
        });

    let mut response = html.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct RenderApiRequest {
    pub url: String,
    #[serde(default)]
    pub screenshot: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderApiResponse {
    pub url: String,
    pub final_url: String,
    pub title: Option<String>,
    pub screenshot: Option<String>,
    pub html: String,
}

/// `POST /api/render`: JSON description of a rendered page.
pub async fn render_api(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let start = Instant::now();
    let result = render_json(&state, &headers, &body).await;
    finish("render-api", &Method::POST, &headers, start, result)
}

async fn render_json(state: &AppState, headers: &HeaderMap, body: &[u8]) -> ProxyResult<Response> {
    let renderer = state
        .renderer
        .as_ref()
        .ok_or_else(|| ProxyError::NotFound("rendering is disabled".to_string()))?;

    let request: RenderApiRequest = serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("expected {{\"url\": ...}}: {e}")))?;
    let target: Url = parse_target(&request.url)?;

    let page = renderer
        .render(RenderRequest {
            url: target.clone(),
            wait: state.config.render.wait_until,
            timeout: state.render_timeout(),
            screenshot: request.screenshot,
        })
        .await?;

    let session = match state.codec.strategy() {
        CodecStrategy::Direct => None,
        CodecStrategy::Session => {
            let session = state.sessions.create_session(&page.final_url);
            Some(crate::target::SessionScope {
                id: session.id,
                base: session.target_base_url,
            })
        }
    };
    let base = proxy_base(headers, &state.config.listener);
    let ctx = RewriteContext::new(page.final_url.clone(), base, session);
    let html = state
        .rewriter
        .rewrite_html_str(&page.html, &ctx)
        .unwrap_or_else(|_| page.html.clone());

    let payload = RenderApiResponse {
        url: target.to_string(),
        final_url: page.final_url.to_string(),
        title: page.title,
        screenshot: page.screenshot.map(|bytes| STANDARD.encode(bytes)),
        html,
    };
    Ok(axum::Json(payload).into_response())
}

/// Anything outside the proxy routes.
pub async fn fallback(request: Request<Body>) -> HandlerResult {
    let start = Instant::now();
    let method = request.method().clone();
    let headers = request.headers().clone();
    let error = ProxyError::NotFound(request.uri().path().to_string());
    finish("none", &method, &headers, start, Err(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_cache_policy() {
        let mut headers = HeaderMap::new();
        apply_cache_policy(&mut headers, RouteKind::Asset, StatusCode::OK, 600);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "public, max-age=600");
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");

        let mut headers = HeaderMap::new();
        apply_cache_policy(&mut headers, RouteKind::Asset, StatusCode::NOT_FOUND, 600);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
    }

    #[test]
    fn test_navigation_cache_policy() {
        let mut headers = HeaderMap::new();
        apply_cache_policy(&mut headers, RouteKind::Navigation, StatusCode::OK, 600);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}

//! Error pages.
//!
//! Every [`ProxyError`] reaching a handler boundary is rendered through
//! [`ErrorPage`]: HTML by default, JSON when the client prefers it.

use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{FetchErrorKind, ProxyError};

/// Structured description of a failure shown to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPage {
    #[serde(skip)]
    pub status: StatusCode,
    #[serde(rename = "status")]
    pub code: u16,
    pub title: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    pub home: &'static str,
}

impl ErrorPage {
    pub fn from_error(error: &ProxyError) -> Self {
        let status = error.status_code();
        let title = match error {
            ProxyError::InvalidUrl(_) => "Invalid URL",
            ProxyError::InvalidRequest(_) => "Bad Request",
            ProxyError::SessionNotFound(_) => "Session Not Found",
            ProxyError::NotFound(_) => "Not Found",
            ProxyError::Fetch { kind: FetchErrorKind::Timeout, .. } => "Origin Timed Out",
            ProxyError::Fetch { .. } => "Origin Unreachable",
            ProxyError::Render { .. } => "Render Failed",
            ProxyError::Internal(_) => "Internal Error",
        };

        Self {
            status,
            code: status.as_u16(),
            title,
            message: error.to_string(),
            target_url: error.target_url().map(str::to_string),
            home: "/",
        }
    }

    pub fn to_html(&self) -> String {
        let target = self
            .target_url
            .as_deref()
            .map(|url| {
                format!(
                    "<p class=\"target\">Target: <code>{}</code></p>",
                    html_escape::encode_text(url)
                )
            })
            .unwrap_or_default();

        format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{code} {title}</title></head>\
             <body><h1>{code} {title}</h1><p>{message}</p>{target}\
             <p><a href=\"{home}\">Back to start</a></p></body></html>",
            code = self.code,
            title = self.title,
            message = html_escape::encode_text(&self.message),
            target = target,
            home = self.home,
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"status\":{}}}", self.code))
    }
}

/// Whether the client prefers JSON over HTML.
pub fn prefers_json(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let accept = accept.to_ascii_lowercase();
    match (accept.find("application/json"), accept.find("text/html")) {
        (Some(json), Some(html)) => json < html,
        (Some(_), None) => true,
        _ => false,
    }
}

/// A [`ProxyError`] bound to the client's preferred representation.
#[derive(Debug)]
pub struct ErrorResponse {
    pub error: ProxyError,
    pub json: bool,
}

impl ErrorResponse {
    pub fn new(error: ProxyError, headers: &HeaderMap) -> Self {
        Self {
            error,
            json: prefers_json(headers),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.error.status_code()
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let page = ErrorPage::from_error(&self.error);
        let (content_type, body) = if self.json {
            ("application/json", page.to_json())
        } else {
            ("text/html; charset=utf-8", page.to_html())
        };

        let mut response = (page.status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

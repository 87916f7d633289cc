//! Content rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamResponse (body + content type)
//!     → classify(content type)
//!     → html.rs   (attributes, inline CSS, base, policy meta, shim)
//!     → css.rs    (url() and @import)
//!     → pass-through (images, fonts, scripts, JSON, ...)
//! ```
//!
//! # Design Decisions
//! - Every reference is rewritten to an absolute proxy URL
//! - A failing reference is left as-is; a failing body is relayed unmodified
//! - `RewriteError` never leaves this module

pub mod context;
pub mod css;
pub mod html;
pub mod shim;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::config::RewriteConfig;
use crate::observability::metrics;
use crate::target::PathCodec;

pub use context::{ProxyReference, RewriteContext, UrlRewriter};

/// Whole-body rewrite failures. Always absorbed by [`ContentRewriter`].
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("body is not valid UTF-8")]
    NotUtf8,

    #[error("html rewriter failed: {0}")]
    Html(String),
}

/// Rewrite rule set selected from a content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    PassThrough,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Css => "css",
            ContentKind::PassThrough => "passthrough",
        }
    }
}

/// Pick the rewrite rule set for a `Content-Type` value.
pub fn classify(content_type: Option<&str>) -> ContentKind {
    let Some(value) = content_type else {
        return ContentKind::PassThrough;
    };
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => ContentKind::Html,
        "text/css" => ContentKind::Css,
        _ => ContentKind::PassThrough,
    }
}

/// Result of one rewrite pass.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub body: Bytes,
    pub kind: ContentKind,
    /// False when the body was relayed verbatim.
    pub rewritten: bool,
}

/// Shared rewriter, one per server.
#[derive(Debug, Clone)]
pub struct ContentRewriter {
    codec: Arc<PathCodec>,
    options: RewriteConfig,
}

impl ContentRewriter {
    pub fn new(codec: Arc<PathCodec>, options: RewriteConfig) -> Self {
        Self { codec, options }
    }

    /// Rewrite a response body according to its content type.
    pub fn rewrite(&self, body: Bytes, content_type: Option<&str>, ctx: &RewriteContext) -> RewriteOutcome {
        let kind = classify(content_type);
        if kind == ContentKind::PassThrough {
            return RewriteOutcome {
                body,
                kind,
                rewritten: false,
            };
        }

        let result = std::str::from_utf8(&body)
            .map_err(|_| RewriteError::NotUtf8)
            .and_then(|text| self.rewrite_text(text, kind, ctx));

        match result {
            Ok(text) => {
                metrics::record_rewrite(kind.as_str(), "rewritten");
                RewriteOutcome {
                    body: Bytes::from(text),
                    kind,
                    rewritten: true,
                }
            }
            Err(e) => {
                tracing::warn!(
                    url = %ctx.original_url,
                    content = kind.as_str(),
                    error = %e,
                    "Rewrite failed, relaying original body"
                );
                metrics::record_rewrite(kind.as_str(), "failed");
                RewriteOutcome {
                    body,
                    kind,
                    rewritten: false,
                }
            }
        }
    }

    /// Rewrite an HTML string, e.g. one produced by the render service.
    pub fn rewrite_html_str(&self, html: &str, ctx: &RewriteContext) -> Result<String, RewriteError> {
        self.rewrite_text(html, ContentKind::Html, ctx)
    }

    fn rewrite_text(&self, text: &str, kind: ContentKind, ctx: &RewriteContext) -> Result<String, RewriteError> {
        let rewriter = UrlRewriter::new(&self.codec, ctx);
        match kind {
            ContentKind::Html => html::rewrite_html(text, &rewriter, &self.options),
            ContentKind::Css => Ok(css::rewrite_css(text, &rewriter, &ctx.original_url)),
            ContentKind::PassThrough => Ok(text.to_string()),
        }
    }
}

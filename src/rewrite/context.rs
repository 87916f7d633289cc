//! Per-document rewrite context and single-reference rewriting.

use url::Url;

use crate::observability::metrics;
use crate::target::{resolve, PathCodec, Resolution, RouteKind, SessionScope};

/// Everything one rewrite pass needs to know about the document.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// Final (post-redirect) URL of the document.
    pub original_url: Url,
    /// Public origin of the proxy, without trailing slash.
    pub proxy_base: String,
    /// Session the document was fetched under (session strategy).
    pub session: Option<SessionScope>,
}

impl RewriteContext {
    pub fn new(original_url: Url, proxy_base: impl Into<String>, session: Option<SessionScope>) -> Self {
        let proxy_base = proxy_base.into().trim_end_matches('/').to_string();
        Self {
            original_url,
            proxy_base,
            session,
        }
    }
}

/// One URL-bearing value found in content.
#[derive(Debug, Clone, Copy)]
pub struct ProxyReference<'a> {
    /// Where the value came from (`href`, `src`, `css url()`, ...).
    pub attribute: &'a str,
    /// Raw text as found in the document.
    pub raw: &'a str,
    pub route: RouteKind,
}

impl<'a> ProxyReference<'a> {
    pub fn new(attribute: &'a str, raw: &'a str, route: RouteKind) -> Self {
        Self { attribute, raw, route }
    }
}

/// Rewrites single references into absolute proxy URLs.
#[derive(Debug, Clone, Copy)]
pub struct UrlRewriter<'a> {
    codec: &'a PathCodec,
    ctx: &'a RewriteContext,
}

impl<'a> UrlRewriter<'a> {
    pub fn new(codec: &'a PathCodec, ctx: &'a RewriteContext) -> Self {
        Self { codec, ctx }
    }

    pub fn context(&self) -> &RewriteContext {
        self.ctx
    }

    pub fn codec(&self) -> &PathCodec {
        self.codec
    }

    /// Rewrite `reference` resolved against `base`.
    ///
    /// Returns `None` when the reference must stay as it is: skipped schemes,
    /// already proxied values and references that fail to resolve.
    pub fn rewrite(&self, reference: ProxyReference<'_>, base: &Url) -> Option<String> {
        if self.codec.is_proxied(reference.raw, &self.ctx.proxy_base) {
            return None;
        }

        let target = match resolve(reference.raw, base) {
            Ok(Resolution::Absolute(url)) => url,
            Ok(Resolution::Skip) => return None,
            Err(e) => {
                tracing::debug!(attribute = reference.attribute, error = %e, "Leaving reference unrewritten");
                metrics::record_reference_error(reference.attribute);
                return None;
            }
        };

        match self.codec.encode(&target, reference.route, self.ctx.session.as_ref()) {
            Ok(path) => Some(format!("{}{}", self.ctx.proxy_base, path)),
            Err(e) => {
                tracing::debug!(attribute = reference.attribute, error = %e, "Failed to encode reference");
                metrics::record_reference_error(reference.attribute);
                None
            }
        }
    }

    /// Rewrite against the document URL.
    pub fn rewrite_from_document(&self, reference: ProxyReference<'_>) -> Option<String> {
        self.rewrite(reference, &self.ctx.original_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodecConfig, CodecStrategy, SessionConfig};
    use crate::session::SessionStore;

    fn direct_codec() -> PathCodec {
        PathCodec::new(&CodecConfig::default())
    }

    #[test]
    fn test_rewrite_round_trips_through_codec() {
        let codec = direct_codec();
        let ctx = RewriteContext::new(
            Url::parse("https://a.com/dir/page.html").unwrap(),
            "http://localhost:8080/",
            None,
        );
        let rewriter = UrlRewriter::new(&codec, &ctx);

        let rewritten = rewriter
            .rewrite_from_document(ProxyReference::new("href", "../x.css", RouteKind::Asset))
            .unwrap();
        assert!(rewritten.starts_with("http://localhost:8080/asset/"));

        let path = rewritten.strip_prefix("http://localhost:8080").unwrap();
        let (kind, rest) = codec.split_path(path).unwrap();
        assert_eq!(kind, RouteKind::Asset);
        let decoded = codec
            .decode(rest, &SessionStore::new(&SessionConfig::default()))
            .unwrap();
        assert_eq!(decoded.url.as_str(), "https://a.com/x.css");
    }

    #[test]
    fn test_rewrite_skips() {
        let codec = direct_codec();
        let ctx = RewriteContext::new(Url::parse("https://a.com/").unwrap(), "http://p", None);
        let rewriter = UrlRewriter::new(&codec, &ctx);

        for raw in [
            "data:text/plain,hi",
            "#section",
            "javascript:void(0)",
            "http://p/proxy/aHR0cHM6Ly9hLmNvbS8",
            "/asset/aHR0cHM6Ly9hLmNvbS8",
            "http://[broken",
        ] {
            assert!(
                rewriter
                    .rewrite_from_document(ProxyReference::new("href", raw, RouteKind::Navigation))
                    .is_none(),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_session_strategy_without_scope_leaves_reference() {
        let codec = PathCodec::new(&CodecConfig {
            strategy: CodecStrategy::Session,
            ..CodecConfig::default()
        });
        let ctx = RewriteContext::new(Url::parse("https://a.com/").unwrap(), "http://p", None);
        let rewriter = UrlRewriter::new(&codec, &ctx);
        assert!(rewriter
            .rewrite_from_document(ProxyReference::new("href", "/x", RouteKind::Navigation))
            .is_none());
    }
}

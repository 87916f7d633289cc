//! Proxy path codec.
//!
//! Converts absolute target URLs into proxy paths and back. Two strategies:
//!
//! ```text
//! direct:  /proxy/<base64url(absolute-url)>
//! session: /proxy/<session-id>/<percent-encoded reference>
//! ```
//!
//! The same scheme is used under the asset prefix; the prefix only selects
//! the caching policy applied to the response.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use url::Url;

use crate::config::{CodecConfig, CodecStrategy};
use crate::error::{ProxyError, ProxyResult};
use crate::session::SessionStore;
use crate::target::resolver::{resolve, Resolution};

/// base64url without padding on encode, padding optional on decode.
const URL_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Which proxy route a reference is encoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Top-level or framed documents (links, forms, iframes).
    Navigation,
    /// Sub-resources (images, scripts, stylesheets, fonts).
    Asset,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Navigation => "navigation",
            RouteKind::Asset => "asset",
        }
    }
}

/// Session id and base URL a document was fetched under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScope {
    pub id: String,
    pub base: Url,
}

/// Result of decoding a proxy path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTarget {
    pub url: Url,
    pub session: Option<SessionScope>,
}

/// Encoder/decoder between target URLs and proxy paths.
#[derive(Debug, Clone)]
pub struct PathCodec {
    strategy: CodecStrategy,
    navigation_prefix: String,
    asset_prefix: String,
}

impl PathCodec {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            strategy: config.strategy,
            navigation_prefix: config.navigation_prefix.clone(),
            asset_prefix: config.asset_prefix.clone(),
        }
    }

    pub fn strategy(&self) -> CodecStrategy {
        self.strategy
    }

    /// Path prefix for a route, including leading and trailing slash.
    pub fn prefix(&self, kind: RouteKind) -> &str {
        match kind {
            RouteKind::Navigation => &self.navigation_prefix,
            RouteKind::Asset => &self.asset_prefix,
        }
    }

    /// Encode an absolute target into a proxy path.
    ///
    /// The session strategy needs the scope of the document being rewritten.
    pub fn encode(
        &self,
        target: &Url,
        kind: RouteKind,
        session: Option<&SessionScope>,
    ) -> ProxyResult<String> {
        let prefix = self.prefix(kind);
        match self.strategy {
            CodecStrategy::Direct => Ok(format!("{prefix}{}", encode_direct(target))),
            CodecStrategy::Session => {
                let scope = session.ok_or_else(|| {
                    ProxyError::InvalidUrl(format!("{target}: session-scoped path without a session"))
                })?;
                Ok(format!(
                    "{prefix}{}/{}",
                    scope.id,
                    urlencoding::encode(&session_reference(target, &scope.base))
                ))
            }
        }
    }

    /// Proxy path for the root of a session (session strategy).
    pub fn session_root(&self, session_id: &str) -> String {
        format!("{}{session_id}/", self.navigation_prefix)
    }

    /// Split a request path into its route and the encoded remainder.
    pub fn split_path<'a>(&self, path: &'a str) -> Option<(RouteKind, &'a str)> {
        if let Some(rest) = path.strip_prefix(self.navigation_prefix.as_str()) {
            Some((RouteKind::Navigation, rest))
        } else {
            path.strip_prefix(self.asset_prefix.as_str())
                .map(|rest| (RouteKind::Asset, rest))
        }
    }

    /// Decode the remainder of a proxy path (prefix already stripped).
    pub fn decode(&self, rest: &str, sessions: &SessionStore) -> ProxyResult<DecodedTarget> {
        match self.strategy {
            CodecStrategy::Direct => Ok(DecodedTarget {
                url: decode_direct(rest)?,
                session: None,
            }),
            CodecStrategy::Session => {
                let (id, reference) = rest.split_once('/').unwrap_or((rest, ""));
                if id.is_empty() {
                    return Err(ProxyError::InvalidUrl("missing session id".to_string()));
                }
                let base = sessions.resolve_session(id)?;
                let url = decode_session_reference(reference, &base)?;
                Ok(DecodedTarget {
                    url,
                    session: Some(SessionScope {
                        id: id.to_string(),
                        base,
                    }),
                })
            }
        }
    }

    /// Whether `reference` already points into the proxy.
    pub fn is_proxied(&self, reference: &str, proxy_base: &str) -> bool {
        let reference = reference.trim();
        let local = if !proxy_base.is_empty() {
            reference.strip_prefix(proxy_base).unwrap_or(reference)
        } else {
            reference
        };
        local.starts_with(self.navigation_prefix.as_str())
            || local.starts_with(self.asset_prefix.as_str())
    }
}

/// base64url encoding of the absolute URL.
pub fn encode_direct(target: &Url) -> String {
    URL_ENGINE.encode(target.as_str())
}

/// Inverse of [`encode_direct`].
pub fn decode_direct(encoded: &str) -> ProxyResult<Url> {
    let segment = encoded.trim_end_matches('/');
    if segment.is_empty() {
        return Err(ProxyError::InvalidUrl("empty proxy path".to_string()));
    }
    let bytes = URL_ENGINE
        .decode(segment)
        .map_err(|e| ProxyError::InvalidUrl(format!("not an encoded URL: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| ProxyError::InvalidUrl("encoded URL is not UTF-8".to_string()))?;
    let url = Url::parse(&text).map_err(|e| ProxyError::InvalidUrl(format!("{text}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ProxyError::InvalidUrl(format!("{text}: only http(s) targets are proxied")));
    }
    Ok(url)
}

/// Shortest reference that resolves back to `target` against `base`.
fn session_reference(target: &Url, base: &Url) -> String {
    if target.origin() == base.origin() {
        // Path, query and fragment of a same-origin target.
        target[url::Position::BeforePath..].to_string()
    } else {
        target.to_string()
    }
}

fn decode_session_reference(reference: &str, base: &Url) -> ProxyResult<Url> {
    let decoded = urlencoding::decode(reference)
        .map_err(|_| ProxyError::InvalidUrl("reference is not UTF-8".to_string()))?;
    if decoded.is_empty() {
        return Ok(base.clone());
    }
    match resolve(&decoded, base) {
        Ok(Resolution::Absolute(url)) => Ok(url),
        Ok(Resolution::Skip) => Err(ProxyError::InvalidUrl(format!(
            "{decoded}: not a proxiable reference"
        ))),
        Err(e) => Err(ProxyError::InvalidUrl(e.to_string())),
    }
}

/// Append an inbound query string to a decoded target.
pub fn append_query(target: &mut Url, query: Option<&str>) {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return;
    };
    let merged = match target.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
        _ => query.to_string(),
    };
    target.set_query(Some(&merged));
}

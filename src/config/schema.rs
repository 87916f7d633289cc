//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the rewriting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, public origin).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Outbound request settings.
    pub upstream: UpstreamConfig,

    /// Session/target store bounds.
    pub sessions: SessionConfig,

    /// Proxy path encoding.
    pub codec: CodecConfig,

    /// Content rewriting toggles.
    pub rewrite: RewriteConfig,

    /// Caching headers on relayed responses.
    pub cache: CacheConfig,

    /// Headless render collaborator.
    pub render: RenderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Public origin of the proxy (e.g., "https://proxy.example.net").
    /// Derived from the Host header when unset. Set this in production:
    /// asset responses are publicly cacheable and embed this origin.
    pub public_base_url: Option<String>,

    /// Honor `X-Forwarded-Host`/`X-Forwarded-Proto` when deriving the public
    /// origin. Only enable behind a reverse proxy that overwrites them.
    pub trust_forwarded_headers: bool,

    /// Maximum inbound request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_base_url: None,
            trust_forwarded_headers: false,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Outbound request timeout (whole fetch incl. redirects) in seconds.
    pub upstream_secs: u64,

    /// Inbound request timeout in seconds. Must exceed `upstream_secs`.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            upstream_secs: 30,
            request_secs: 45,
        }
    }
}

/// Outbound request configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// User-Agent sent to origins.
    pub user_agent: String,

    /// Accept header sent to origins.
    pub accept: String,

    /// Accept-Language header sent to origins.
    pub accept_language: String,

    /// Maximum redirects followed per fetch.
    pub max_redirects: usize,

    /// Maximum origin response body size in bytes.
    pub max_response_bytes: usize,

    /// Inbound request headers forwarded to the origin (lowercase names).
    pub forward_headers: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
            max_redirects: 10,
            max_response_bytes: 32 * 1024 * 1024, // 32MB
            forward_headers: vec!["content-type".to_string(), "cookie".to_string()],
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of live sessions.
    pub capacity: usize,

    /// Session time-to-live in seconds, measured from creation.
    pub ttl_secs: u64,

    /// Interval of the background expiry sweep in seconds.
    pub sweep_interval_secs: u64,

    /// Length of generated session identifiers.
    pub id_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_secs: 3600,
            sweep_interval_secs: 60,
            id_length: 16,
        }
    }
}

/// How target URLs are carried in proxy paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecStrategy {
    /// Base64url of the absolute target URL in the path.
    #[default]
    Direct,
    /// Session id plus a percent-encoded reference resolved against the session base.
    Session,
}

/// Proxy path codec configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Encoding strategy for this deployment.
    pub strategy: CodecStrategy,

    /// Path prefix for navigational documents.
    pub navigation_prefix: String,

    /// Path prefix for sub-resources.
    pub asset_prefix: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            strategy: CodecStrategy::Direct,
            navigation_prefix: "/proxy/".to_string(),
            asset_prefix: "/asset/".to_string(),
        }
    }
}

/// Content rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Inject a `<base>` tag when the document has none.
    pub inject_base: bool,

    /// Inject the client runtime shim into HTML documents.
    pub inject_shim: bool,

    /// Remove CSP / X-Frame-Options meta tags.
    pub strip_csp_meta: bool,

    /// Remove subresource `integrity` attributes.
    pub strip_integrity: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            inject_base: true,
            inject_shim: true,
            strip_csp_meta: true,
            strip_integrity: true,
        }
    }
}

/// Caching policy for relayed responses.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `max-age` for successful asset responses in seconds.
    pub asset_max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            asset_max_age_secs: 3600,
        }
    }
}

/// Page-load condition the render collaborator waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// The `load` event fired.
    Load,
    /// DOM parsed.
    DomContentLoaded,
    /// No network activity for a short period.
    #[default]
    NetworkIdle,
}

impl WaitCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitCondition::Load => "load",
            WaitCondition::DomContentLoaded => "domcontentloaded",
            WaitCondition::NetworkIdle => "networkidle",
        }
    }
}

/// Headless render collaborator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Enable the render endpoints.
    pub enabled: bool,

    /// Render service endpoint (receives JSON POSTs).
    pub endpoint: String,

    /// Render timeout in seconds.
    pub timeout_secs: u64,

    /// Default wait condition.
    pub wait_until: WaitCondition,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://127.0.0.1:3001/render".to_string(),
            timeout_secs: 30,
            wait_until: WaitCondition::NetworkIdle,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Rewriting forward proxy.
//!
//! Fetches arbitrary origin pages on behalf of a browser and rewrites every
//! URL in HTML and CSS so that follow-up navigation, sub-resource loads and
//! script-initiated requests flow back through the proxy.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod render;
pub mod rewrite;
pub mod session;
pub mod target;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;

//! Outbound fetch subsystem.
//!
//! # Data Flow
//! ```text
//! decoded target + inbound method/headers/body
//!     → client.rs (forward whitelisted headers, follow redirects, bounded body)
//!     → response.rs (UpstreamResponse, header relay rules)
//! ```
//!
//! # Design Decisions
//! - No retries; a failed fetch is reported once with its kind
//! - Non-2xx origin answers are successful fetches
//! - The final URL after redirects is the base for rewriting

pub mod client;
pub mod response;

pub use client::{ForwardRequest, Forwarder};
pub use response::{forward_headers, relay_headers, strip_cookie_domain, UpstreamResponse};

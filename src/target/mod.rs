//! Target URL handling.
//!
//! # Data Flow
//! ```text
//! reference found in content + document base
//!     → resolver.rs (absolute URL | Skip | InvalidReference)
//!     → codec.rs (absolute URL → proxy path)
//!
//! inbound proxy path
//!     → codec.rs (proxy path → absolute URL, via session store if needed)
//! ```

pub mod codec;
pub mod resolver;

pub use codec::{append_query, DecodedTarget, PathCodec, RouteKind, SessionScope};
pub use resolver::{parse_target, resolve, InvalidReference, Resolution};

//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! POST /api/create-session
//!     → store.rs (generate id, record target base URL)
//!
//! GET /proxy/<id>/<ref>
//!     → codec resolves <id> via store.rs
//!     → expired or unknown id → SessionNotFound (404)
//!
//! sweeper.rs
//!     periodic timer → purge expired entries
//! ```
//!
//! # Design Decisions
//! - TTL is measured from creation; access only affects capacity eviction order
//! - Store is injected into handlers, never a global
//! - Concurrent reads never block on eviction

pub mod store;
pub mod sweeper;

pub use store::{Session, SessionStore};
pub use sweeper::SessionSweeper;

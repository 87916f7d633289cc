//! Session/target store.
//!
//! Maps opaque session identifiers to the target base URL they were created
//! for. Bounded by capacity and time-to-live.

use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::config::SessionConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::observability::metrics;

/// A server-held association between an id and a target base URL.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub target_base_url: Url,
    pub created_at: Instant,
    pub last_access: Instant,
}

impl Session {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Thread-safe session store with TTL expiry and capacity eviction.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    /// Serializes eviction passes so concurrent inserts don't over-evict.
    eviction: Mutex<()>,
    capacity: usize,
    ttl: Duration,
    id_length: usize,
}

impl SessionStore {
    /// Create an empty store from configuration.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            eviction: Mutex::new(()),
            capacity: config.capacity,
            ttl: Duration::from_secs(config.ttl_secs),
            id_length: config.id_length,
        }
    }

    /// Time-to-live applied to every session.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a new session for `target`.
    pub fn create_session(&self, target: &Url) -> Session {
        let now = Instant::now();
        let session = loop {
            let id = self.generate_id();
            if self.sessions.contains_key(&id) {
                continue;
            }
            let session = Session {
                id: id.clone(),
                target_base_url: target.clone(),
                created_at: now,
                last_access: now,
            };
            self.sessions.insert(id, session.clone());
            break session;
        };

        tracing::debug!(session_id = %session.id, target = %target, "Session created");

        if self.sessions.len() > self.capacity {
            self.evict(now);
        }
        metrics::record_sessions_active(self.sessions.len());
        session
    }

    /// Look up the target base URL for `id`.
    ///
    /// Expired entries are removed and reported as not found.
    pub fn resolve_session(&self, id: &str) -> ProxyResult<Url> {
        let now = Instant::now();
        let expired = match self.sessions.get(id) {
            Some(entry) if !entry.is_expired(now, self.ttl) => {
                return Ok(entry.target_base_url.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.sessions.remove_if(id, |_, s| s.is_expired(now, self.ttl));
            metrics::record_session_evicted("expired");
            metrics::record_sessions_active(self.sessions.len());
        }
        Err(ProxyError::SessionNotFound(id.to_string()))
    }

    /// Mark the session as recently used. Does not extend its TTL.
    pub fn touch(&self, id: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                entry.last_access = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now, self.ttl));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            for _ in 0..removed {
                metrics::record_session_evicted("expired");
            }
            metrics::record_sessions_active(self.sessions.len());
        }
        removed
    }

    /// Number of sessions currently held (expired ones included until purged).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict(&self, now: Instant) {
        let _guard = self.eviction.lock().unwrap_or_else(|e| e.into_inner());

        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now, self.ttl));
        for _ in 0..before.saturating_sub(self.sessions.len()) {
            metrics::record_session_evicted("expired");
        }

        let overflow = self.sessions.len().saturating_sub(self.capacity);
        if overflow == 0 {
            return;
        }

        let mut candidates: Vec<(Instant, Instant, String)> = self
            .sessions
            .iter()
            .map(|r| (r.last_access, r.created_at, r.key().clone()))
            .collect();
        candidates.sort();

        for (_, _, id) in candidates.into_iter().take(overflow) {
            self.sessions.remove(&id);
            metrics::record_session_evicted("capacity");
            tracing::debug!(session_id = %id, "Session evicted (capacity)");
        }
    }

    fn generate_id(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.id_length)
            .map(char::from)
            .collect()
    }
}

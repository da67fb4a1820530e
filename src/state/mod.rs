//! Session state store
//!
//! Keyed map of session id → Session. Each session sits behind its own
//! async mutex: a turn holds the guard from dispatch to response, so turns on
//! one session never interleave while distinct sessions proceed in parallel.
//! Currently in-memory only.

use crate::models::Session;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

type SessionSlot = Arc<Mutex<Session>>;

pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionSlot>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Exclusive access to a session, created on first use. Hold the guard
    /// for the whole turn.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<Session> {
        loop {
            let slot = self.slot(session_id).await;
            let guard = slot.clone().lock_owned().await;

            // The slot may have been evicted while we waited on its lock.
            let current = {
                let sessions = self.sessions.read().await;
                sessions
                    .get(session_id)
                    .map_or(false, |live| Arc::ptr_eq(live, &slot))
            };
            if current {
                return guard;
            }
            debug!(session_id, "Session evicted while waiting, retrying");
        }
    }

    async fn slot(&self, session_id: &str) -> SessionSlot {
        let existing = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).cloned()
        };

        match existing {
            Some(slot) => slot,
            None => {
                let mut sessions = self.sessions.write().await;
                sessions
                    .entry(session_id.to_string())
                    .or_insert_with(|| {
                        debug!(session_id, "Session created");
                        Arc::new(Mutex::new(Session::new(session_id)))
                    })
                    .clone()
            }
        }
    }

    /// Copy of a session's current state, waiting for any turn in progress.
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let slot = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).cloned()
        }?;
        let session = slot.lock().await;
        Some(session.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions untouched for longer than `max_idle`. Sessions with a
    /// turn in progress are skipped. Returns how many were removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(max_idle) {
            Ok(idle) => Utc::now() - idle,
            Err(_) => return 0,
        };

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(session) => session.updated_at >= cutoff,
            Err(_) => true,
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

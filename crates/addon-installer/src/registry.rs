//! SessionRegistry -- active install sessions keyed by session id.
//!
//! The registry is the only state shared between an install flow and the
//! cancel requests that target it. Each active session owns exactly one
//! [`CancellationToken`]; the entry lives for as long as the session's
//! [`SessionGuard`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cancellation::CancellationToken;
use crate::errors::SessionError;
use crate::models::SessionId;

/// Concurrent map of active session ids to their cancellation tokens.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, CancellationToken>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new session and return its guard.
    ///
    /// Fails with [`SessionError::AlreadyActive`] if the id is in use; the
    /// existing session is left untouched.
    pub fn register(self: &Arc<Self>, session_id: SessionId) -> Result<SessionGuard, SessionError> {
        let token = CancellationToken::new();
        {
            let mut sessions = self.sessions.lock().unwrap();
            if sessions.contains_key(&session_id) {
                return Err(SessionError::AlreadyActive { session_id });
            }
            sessions.insert(session_id, token.clone());
        }
        log::debug!("session {session_id} registered");

        Ok(SessionGuard {
            registry: Arc::clone(self),
            session_id,
            token,
        })
    }

    /// Signal the session's token.
    ///
    /// Returns `true` if this call delivered the cancellation. Unknown or
    /// already-resolved ids, and repeat calls, return `false`.
    pub fn cancel(&self, session_id: SessionId) -> bool {
        // Clone out so the token is signaled without holding the map lock.
        let token = self.sessions.lock().unwrap().get(&session_id).cloned();
        match token {
            Some(token) => token.cancel(),
            None => false,
        }
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.lock().unwrap().contains_key(&session_id)
    }

    /// Snapshot of active ids, sorted.
    pub fn active_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.lock().unwrap().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the entry only if it still holds `token`.
    fn release(&self, session_id: SessionId, token: &CancellationToken) {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions
            .get(&session_id)
            .is_some_and(|current| current.same_token(token))
        {
            sessions.remove(&session_id);
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SessionGuard
// ---------------------------------------------------------------------------

/// Scoped registration of one session.
///
/// Dropping the guard unregisters the session, whether the install
/// succeeded, failed, raised, or its future was dropped mid-flight.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session_id: SessionId,
    token: CancellationToken,
}

impl SessionGuard {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The session's cancellation token (a clone of the registered one).
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.release(self.session_id, &self.token);
        log::debug!("session {} unregistered", self.session_id);
    }
}

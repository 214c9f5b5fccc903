//! Cancellation primitive for cooperative install cancellation.
//!
//! The orchestrator provides the MECHANISM (a one-shot token per session).
//! The caller provides the POLICY (when to cancel).
//!
//! # State Machine
//!
//! ```text
//! Running ──→ Cancelled
//! ```
//!
//! The transition is a one-way latch: it happens at most once and is never
//! reset. Engines observe the token at safe checkpoints (between phases,
//! between retry attempts) via [`CancellationToken::checkpoint`], or race
//! long waits against [`CancellationToken::cancelled`].

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::errors::EngineError;

// ---------------------------------------------------------------------------
// CancellationState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationState {
    #[default]
    Running,
    Cancelled,
}

struct Inner {
    state: Mutex<CancellationState>,
    notify: Notify,
}

// ---------------------------------------------------------------------------
// CancellationToken
// ---------------------------------------------------------------------------

/// One-shot cancellation signal shared between a session and its engine.
///
/// Cloning yields another handle to the same latch, so the token can be
/// moved across `tokio::spawn` boundaries.
///
/// # Example
///
/// ```rust
/// use addon_installer::cancellation::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// assert!(token.cancel());
/// assert!(!token.cancel()); // already signaled
/// assert!(token.checkpoint().is_err());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CancellationState::Running),
                notify: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> CancellationState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == CancellationState::Cancelled
    }

    /// Signal cancellation.
    ///
    /// Returns `true` if this call flipped the latch, `false` if the token
    /// was already cancelled. Concurrent callers see exactly one `true`.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state == CancellationState::Cancelled {
                return false;
            }
            *state = CancellationState::Cancelled;
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Resolve once the token is cancelled (immediately if it already is).
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking so a concurrent `cancel`
            // between the check and the await is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Checkpoint for engines: `Err(UserAborted)` once cancelled.
    pub fn checkpoint(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::aborted())
        } else {
            Ok(())
        }
    }

    /// Whether two handles share the same latch.
    pub fn same_token(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

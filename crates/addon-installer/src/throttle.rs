//! Rate limiting for high-frequency progress events.
//!
//! Download progress can fire once per received chunk. The throttle lets a
//! `downloadProgress` event through only when the interval has elapsed
//! since the last one relayed *for the same session*; every other kind
//! passes immediately. The first progress event of a session always passes.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::DEFAULT_PROGRESS_INTERVAL_MS;
use crate::events::LifecycleEvent;

/// Per-session throttle bookkeeping. Owned by the session's event sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleState {
    pub last_progress_emitted_at: Option<Instant>,
}

/// Stateless throttling rule; pair [`should_emit`](Self::should_emit) with
/// [`record_emission`](Self::record_emission).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressThrottle {
    interval: Duration,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn should_emit(&self, event: &LifecycleEvent, state: &ThrottleState, now: Instant) -> bool {
        if !event.kind().is_high_frequency() {
            return true;
        }
        match state.last_progress_emitted_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Record that a progress event was relayed at `now`.
    pub fn record_emission(&self, state: &mut ThrottleState, now: Instant) {
        state.last_progress_emitted_at = Some(now);
    }

    /// Check and record in one step. Returns whether to relay the event.
    pub fn admit(&self, event: &LifecycleEvent, state: &mut ThrottleState, now: Instant) -> bool {
        if !self.should_emit(event, state, now) {
            return false;
        }
        if event.kind().is_high_frequency() {
            self.record_emission(state, now);
        }
        true
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS))
    }
}

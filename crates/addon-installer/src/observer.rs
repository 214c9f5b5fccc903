//! Observer fan-out and per-session event relaying.
//!
//! Engines raise [`LifecycleEvent`]s into an [`EventSink`]. The sink tags
//! each event with its session id, runs it through the session's
//! [`ProgressThrottle`], and hands what survives to the shared
//! [`ObserverRegistry`], which delivers it to every registered
//! [`InstallObserver`] and channel subscriber.
//!
//! # Delivery Semantics
//!
//! | Guarantee            | How                                                 |
//! |----------------------|-----------------------------------------------------|
//! | Engine order         | The sink holds its state lock across dispatch       |
//! | No cross-session lag | Throttle state lives in the sink, one per session   |
//! | No late events       | A detached sink drops everything it is given        |
//! | No leaked listeners  | [`Subscription`] detaches its sink on drop          |
//!
//! # Connections
//!
//! - [`crate::orchestrator::InstallManager`] creates one sink per install.
//! - [`crate::status::StatusTracker`] is an observer.
//! - Engines only ever see [`EventSink`] (see [`crate::engine`]).

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::events::{LifecycleEvent, SessionEvent};
use crate::models::SessionId;
use crate::throttle::{ProgressThrottle, ThrottleState};

// ---------------------------------------------------------------------------
// InstallObserver
// ---------------------------------------------------------------------------

/// Receives relayed session events.
///
/// Called synchronously on the engine's emitting task, in engine order.
/// Implementations should return quickly; observers that need to do async
/// work should use [`ObserverRegistry::subscribe`] instead.
pub trait InstallObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

// ---------------------------------------------------------------------------
// ObserverRegistry
// ---------------------------------------------------------------------------

struct ObserverEntry {
    observer: Arc<dyn InstallObserver>,
    name: String,
    /// Unique ID for unregistration.
    id: u64,
}

/// Shared set of observers and channel subscribers.
pub struct ObserverRegistry {
    /// Wrapped in `Arc` so unregister closures can hold a reference.
    observers: Arc<Mutex<Vec<ObserverEntry>>>,
    channels: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
    next_id: Mutex<u64>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: Arc::new(Mutex::new(Vec::new())),
            channels: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Register an observer for events of every session.
    ///
    /// Returns an unregister closure; calling it more than once is harmless.
    pub fn register(
        &self,
        observer: Arc<dyn InstallObserver>,
        name: Option<String>,
    ) -> Box<dyn Fn() + Send + Sync> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };

        let name = name.unwrap_or_else(|| format!("observer-{id}"));
        log::debug!("registering install observer {name}");
        self.observers.lock().unwrap().push(ObserverEntry {
            observer,
            name,
            id,
        });

        let observers_ref = self.observers.clone();
        Box::new(move || {
            observers_ref.lock().unwrap().retain(|e| e.id != id);
        })
    }

    /// Open a channel receiving every relayed event.
    ///
    /// The subscription ends when the receiver is dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.lock().unwrap().push(tx);
        rx
    }

    /// [`subscribe`](Self::subscribe) wrapped as a `Stream`.
    pub fn subscribe_stream(&self) -> UnboundedReceiverStream<SessionEvent> {
        UnboundedReceiverStream::new(self.subscribe())
    }

    /// Names of registered observers, in registration order.
    pub fn list_observers(&self) -> Vec<String> {
        self.observers
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Deliver an event to every observer, then every live channel.
    pub fn dispatch(&self, event: &SessionEvent) {
        // Snapshot so observers may register or unregister from `on_event`.
        let observers: Vec<Arc<dyn InstallObserver>> = self
            .observers
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.observer.clone())
            .collect();

        for observer in &observers {
            observer.on_event(event);
        }

        // Closed receivers are pruned here.
        self.channels
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

struct SinkState {
    throttle: ThrottleState,
    detached: bool,
}

struct SinkInner {
    session_id: SessionId,
    throttle: ProgressThrottle,
    observers: Arc<ObserverRegistry>,
    state: Mutex<SinkState>,
}

/// The per-session event channel handed to an engine.
///
/// Cheap to clone; all clones share the session's throttle state and
/// detachment flag.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

impl EventSink {
    pub fn new(
        session_id: SessionId,
        throttle: ProgressThrottle,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                session_id,
                throttle,
                observers,
                state: Mutex::new(SinkState {
                    throttle: ThrottleState::default(),
                    detached: false,
                }),
            }),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    /// Relay an event. Returns `false` if it was throttled or the sink is
    /// detached.
    pub fn emit(&self, event: LifecycleEvent) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if state.detached {
            log::trace!(
                "session {}: dropping {} after detach",
                self.inner.session_id,
                event.kind()
            );
            return false;
        }

        if !self
            .inner
            .throttle
            .admit(&event, &mut state.throttle, Instant::now())
        {
            log::trace!("session {}: throttled {}", self.inner.session_id, event.kind());
            return false;
        }

        let tagged = SessionEvent::new(self.inner.session_id, event);
        // Still holding the state lock: concurrent emitters on this session
        // are delivered one at a time, in lock order.
        self.inner.observers.dispatch(&tagged);
        true
    }

    pub fn is_detached(&self) -> bool {
        self.inner.state.lock().unwrap().detached
    }

    /// Stop relaying. Idempotent.
    pub fn detach(&self) {
        self.inner.state.lock().unwrap().detached = true;
    }

    /// Scope this sink to the returned handle: dropping it detaches.
    pub fn subscription(&self) -> Subscription {
        Subscription { sink: self.clone() }
    }

    /// Current throttle bookkeeping (for diagnostics and tests).
    pub fn throttle_state(&self) -> ThrottleState {
        self.inner.state.lock().unwrap().throttle
    }
}

/// Detaches its [`EventSink`] when dropped.
pub struct Subscription {
    sink: EventSink,
}

impl Subscription {
    pub fn sink(&self) -> &EventSink {
        &self.sink
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.sink.detach();
    }
}

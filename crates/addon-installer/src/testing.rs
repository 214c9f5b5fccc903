//! Test utilities: a scripted engine and a recording observer.
//!
//! These fakes let orchestrator behaviour be exercised without a network or
//! archive engine. A [`FakeEngine`] replays a list of [`Step`]s, checking
//! its cancellation token exactly where the script says to.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use crate::engine::{EngineFactory, EngineRequest, InstallEngine};
use crate::errors::EngineError;
use crate::events::{EventKind, LifecycleEvent, SessionEvent};
use crate::models::SessionId;
use crate::observer::{EventSink, InstallObserver};

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One scripted action of a [`FakeEngine`].
#[derive(Debug, Clone)]
pub enum Step {
    /// Raise an event.
    Emit(LifecycleEvent),
    /// Return `UserAborted` if cancellation was requested.
    Checkpoint,
    /// Block until cancelled, then return `UserAborted`.
    WaitForCancel,
    /// Sleep on the tokio clock.
    Sleep(Duration),
    /// Fail with the given error.
    Fail(EngineError),
}

/// Download, unzip, and copy one module, with checkpoints between phases.
pub fn module_steps(module: &str, progress_ticks: u64) -> Vec<Step> {
    let m = Some(module);
    let mut steps = vec![Step::Emit(LifecycleEvent::download_started(m))];
    for tick in 1..=progress_ticks {
        steps.push(Step::Emit(LifecycleEvent::download_progress(
            m,
            tick,
            Some(progress_ticks),
        )));
    }
    steps.extend([
        Step::Emit(LifecycleEvent::download_finished(m)),
        Step::Checkpoint,
        Step::Emit(LifecycleEvent::unzip_started(m)),
        Step::Emit(LifecycleEvent::unzip_finished(m)),
        Step::Checkpoint,
        Step::Emit(LifecycleEvent::copy_started(m)),
        Step::Emit(LifecycleEvent::copy_finished(m)),
    ]);
    steps
}

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

/// An engine that replays a fixed script.
pub struct FakeEngine {
    request: EngineRequest,
    steps: Vec<Step>,
}

impl FakeEngine {
    pub fn new(request: EngineRequest, steps: Vec<Step>) -> Self {
        Self { request, steps }
    }
}

impl InstallEngine for FakeEngine {
    fn install(
        &self,
        events: EventSink,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + '_>> {
        Box::pin(async move {
            let token = &self.request.cancellation;
            for step in &self.steps {
                match step {
                    Step::Emit(event) => {
                        events.emit(event.clone());
                    }
                    Step::Checkpoint => token.checkpoint()?,
                    Step::WaitForCancel => {
                        token.cancelled().await;
                        return Err(EngineError::aborted());
                    }
                    Step::Sleep(duration) => tokio::time::sleep(*duration).await,
                    Step::Fail(error) => return Err(error.clone()),
                }
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// FakeEngineFactory
// ---------------------------------------------------------------------------

/// Builds [`FakeEngine`]s, choosing the script by source URL.
pub struct FakeEngineFactory {
    default_steps: Vec<Step>,
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    requests: Mutex<Vec<EngineRequest>>,
}

impl FakeEngineFactory {
    /// Every URL without its own script replays `default_steps`.
    pub fn new(default_steps: Vec<Step>) -> Self {
        Self {
            default_steps,
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, source_url: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(source_url.to_string(), steps);
        self
    }

    /// Every request an engine was built for, in order.
    pub fn recorded_requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(&self, request: EngineRequest) -> Box<dyn InstallEngine> {
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.source_url)
            .cloned()
            .unwrap_or_else(|| self.default_steps.clone());
        self.requests.lock().unwrap().push(request.clone());
        Box::new(FakeEngine::new(request, steps))
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// Records every event it is given.
pub struct RecordingObserver {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    /// Kinds recorded for one session, in delivery order.
    pub fn kinds_for(&self, session_id: SessionId) -> Vec<EventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.session_id == session_id)
            .map(|e| e.kind())
            .collect()
    }
}

impl Default for RecordingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallObserver for RecordingObserver {
    fn on_event(&self, event: &SessionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

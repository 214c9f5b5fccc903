//! InstallManager -- drives install sessions end to end.
//!
//! Each call to [`InstallManager::install`] is one session:
//! register → build engine → relay events → resolve outcome → release.
//!
//! # Outcome classification
//!
//! | Engine result                                  | Resolution                    |
//! |------------------------------------------------|-------------------------------|
//! | `Ok(())`                                       | `Ok(Success)`                 |
//! | `Err(UserAborted)`                             | `Ok(Cancelled)`               |
//! | `Err(classified)` after cancel was requested   | `Ok(Cancelled)`               |
//! | `Err(classified)`                              | `Ok(ClassifiedFailure)`       |
//! | `Err(Unclassified)`                            | `Err(InstallError::Unclassified)` |
//!
//! Unclassified failures are raised even when the session was cancelled:
//! they indicate a defect and must stay visible.
//!
//! # Connections
//!
//! - Registers sessions in a [`SessionRegistry`].
//! - Builds engines through an [`EngineFactory`].
//! - Relays events via a per-session [`EventSink`] into an [`ObserverRegistry`].
//! - Delegates uninstall to [`crate::cleanup::uninstall`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cleanup;
use crate::config::InstallerConfig;
use crate::engine::{EngineFactory, EngineRequest};
use crate::errors::{CleanupError, EngineError, InstallError};
use crate::events::SessionEvent;
use crate::models::{CleanupReport, EngineOptions, InstallOutcome, InstallRequest, SessionId};
use crate::observer::{EventSink, InstallObserver, ObserverRegistry};
use crate::registry::SessionRegistry;
use crate::throttle::ProgressThrottle;

/// Entry point for the UI/CLI layer.
///
/// Share it behind an `Arc` so installs and cancels can run from different
/// tasks.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use addon_installer::orchestrator::InstallManager;
/// use addon_installer::models::{InstallOutcome, InstallRequest, SessionId};
/// use addon_installer::testing::{module_steps, FakeEngineFactory};
///
/// # tokio_test_block_on(async {
/// let manager = InstallManager::new(Arc::new(FakeEngineFactory::new(module_steps("base", 3))));
/// let outcome = manager
///     .install(InstallRequest::new(SessionId(1), "https://cdn.example.com/addon", "/tmp/t", "/tmp/d"))
///     .await
///     .unwrap();
/// assert_eq!(outcome, InstallOutcome::Success);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct InstallManager {
    config: InstallerConfig,
    factory: Arc<dyn EngineFactory>,
    sessions: Arc<SessionRegistry>,
    observers: Arc<ObserverRegistry>,
}

impl InstallManager {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_config(factory, InstallerConfig::default())
    }

    pub fn with_config(factory: Arc<dyn EngineFactory>, config: InstallerConfig) -> Self {
        Self {
            config,
            factory,
            sessions: Arc::new(SessionRegistry::new()),
            observers: Arc::new(ObserverRegistry::new()),
        }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    // -- Observation --

    /// Register an observer for every session. Returns an unregister closure.
    pub fn register_observer(
        &self,
        observer: Arc<dyn InstallObserver>,
        name: Option<String>,
    ) -> Box<dyn Fn() + Send + Sync> {
        self.observers.register(observer, name)
    }

    /// Channel of `(session id, kind, payload)` events for every session.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.observers.subscribe()
    }

    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    // -- Session introspection --

    pub fn is_active(&self, session_id: SessionId) -> bool {
        self.sessions.contains(session_id)
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.sessions.active_ids()
    }

    // -- Operations --

    /// Run one install session to its terminal outcome.
    ///
    /// The session is unregistered and its event sink detached before this
    /// returns, on every path. Dropping the returned future mid-flight
    /// releases the session the same way.
    ///
    /// # Errors
    ///
    /// - [`InstallError::Session`] if `request.session_id` is already active
    /// - [`InstallError::Unclassified`] if the engine failed in a way it
    ///   does not recognize
    pub async fn install(&self, request: InstallRequest) -> Result<InstallOutcome, InstallError> {
        let session_id = request.session_id;
        let guard = self.sessions.register(session_id)?;

        let sink = EventSink::new(
            session_id,
            ProgressThrottle::new(self.config.progress_interval()),
            self.observers.clone(),
        );
        let subscription = sink.subscription();

        let engine = self.factory.create(EngineRequest {
            source_url: request.source_url.clone(),
            dest_dir: request.dest_dir.clone(),
            cancellation: guard.token().clone(),
            options: EngineOptions {
                temporary_directory: request.temp_dir.clone(),
                max_module_retries: self.config.max_module_retries,
            },
        });

        log::info!(
            "session {session_id}: installing {} into {}",
            request.source_url,
            request.dest_dir.display()
        );

        let result = engine.install(sink).await;
        let cancel_requested = guard.token().is_cancelled();

        // Release before reporting anything upward.
        drop(engine);
        drop(subscription);
        drop(guard);

        resolve(session_id, result, cancel_requested)
    }

    /// Request cancellation of an active session.
    ///
    /// Unknown or already-resolved ids are ignored: a cancel racing with
    /// natural completion is expected.
    pub fn cancel(&self, session_id: SessionId) {
        if self.sessions.cancel(session_id) {
            log::info!("session {session_id}: cancellation requested");
        } else {
            log::debug!("session {session_id}: cancel ignored (not active or already cancelled)");
        }
    }

    /// Remove an installed addon and its cached artifacts, keeping the
    /// configured reserved cache entry.
    ///
    /// Must not run concurrently with an install into `primary_dir`.
    pub async fn uninstall(
        &self,
        primary_dir: &Path,
        cache_dirs: &[PathBuf],
    ) -> Result<CleanupReport, CleanupError> {
        cleanup::uninstall(primary_dir, cache_dirs, &self.config.reserved_cache_entry).await
    }
}

fn resolve(
    session_id: SessionId,
    result: Result<(), EngineError>,
    cancel_requested: bool,
) -> Result<InstallOutcome, InstallError> {
    match result {
        Ok(()) => {
            log::info!("session {session_id}: install complete");
            Ok(InstallOutcome::Success)
        }
        Err(error) if !error.is_classified() => {
            log::warn!("session {session_id}: unclassified install failure: {error}");
            Err(InstallError::Unclassified(error))
        }
        Err(error) if error.is_abort() || cancel_requested => {
            log::info!("session {session_id}: install cancelled ({error})");
            Ok(InstallOutcome::Cancelled)
        }
        Err(error) => {
            log::warn!("session {session_id}: install failed ({}): {error}", error.kind);
            Ok(InstallOutcome::ClassifiedFailure { error })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::errors::{EngineErrorKind, SessionError};
    use crate::events::{EventKind, LifecycleEvent};
    use crate::testing::{module_steps, FakeEngineFactory, RecordingObserver, Step};

    fn request(id: u64, url: &str) -> InstallRequest {
        InstallRequest::new(id, url, "/tmp/addon-temp", "/tmp/addon-dest")
    }

    fn manager_with(factory: FakeEngineFactory) -> (Arc<InstallManager>, Arc<RecordingObserver>) {
        let manager = Arc::new(InstallManager::new(Arc::new(factory)));
        let observer = Arc::new(RecordingObserver::new());
        manager.register_observer(observer.clone(), Some("recorder".into()));
        (manager, observer)
    }

    /// Wait until the session has relayed its first event.
    async fn started(rx: &mut mpsc::UnboundedReceiver<SessionEvent>, session_id: SessionId) {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if event.session_id == session_id {
                return;
            }
        }
    }

    // ---------------------------------------------------------------
    // Outcome classification
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn success_resolves_to_success() {
        let (manager, observer) = manager_with(FakeEngineFactory::new(module_steps("base", 0)));
        let outcome = manager.install(request(1, "https://a")).await.unwrap();
        assert_eq!(outcome, InstallOutcome::Success);
        assert_eq!(
            observer.kinds_for(SessionId(1)),
            vec![
                EventKind::DownloadStarted,
                EventKind::DownloadFinished,
                EventKind::UnzipStarted,
                EventKind::UnzipFinished,
                EventKind::CopyStarted,
                EventKind::CopyFinished,
            ]
        );
    }

    #[tokio::test]
    async fn classified_message_resolves_to_failure_value() {
        let factory = FakeEngineFactory::new(vec![Step::Fail(EngineError::from_message(
            "FragmenterError: corrupt archive",
        ))]);
        let (manager, _) = manager_with(factory);

        let outcome = manager.install(request(2, "https://a")).await.unwrap();
        let error = outcome.error().expect("classified failure");
        assert_eq!(error.message, "FragmenterError: corrupt archive");
        assert!(!manager.is_active(SessionId(2)));
    }

    #[tokio::test]
    async fn unclassified_message_is_raised() {
        let factory =
            FakeEngineFactory::new(vec![Step::Fail(EngineError::from_message("TypeError: null deref"))]);
        let (manager, _) = manager_with(factory);

        let err = manager.install(request(3, "https://a")).await.unwrap_err();
        match err {
            InstallError::Unclassified(e) => assert_eq!(e.message, "TypeError: null deref"),
            other => panic!("expected unclassified, got {other:?}"),
        }
        assert!(!manager.is_active(SessionId(3)));
    }

    #[tokio::test]
    async fn classified_kinds_are_failure_values() {
        for kind in [
            EngineErrorKind::NetworkError,
            EngineErrorKind::ModuleCrcMismatch,
            EngineErrorKind::MaxModuleRetries,
            EngineErrorKind::NoSpaceOnDevice,
        ] {
            let factory = FakeEngineFactory::new(vec![Step::Fail(EngineError::new(kind, "x"))]);
            let (manager, _) = manager_with(factory);
            let outcome = manager.install(request(1, "https://a")).await.unwrap();
            assert_eq!(outcome.error().map(|e| e.kind), Some(kind));
        }
    }

    #[test]
    fn unclassified_is_raised_even_after_cancel() {
        let result = resolve(SessionId(1), Err(EngineError::unclassified("bug")), true);
        assert!(matches!(result, Err(InstallError::Unclassified(_))));
    }

    #[test]
    fn classified_failure_after_cancel_is_cancelled() {
        let error = EngineError::new(EngineErrorKind::NetworkError, "socket closed");
        assert_eq!(
            resolve(SessionId(1), Err(error), true).unwrap(),
            InstallOutcome::Cancelled
        );
    }

    // ---------------------------------------------------------------
    // Session bookkeeping
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn engine_receives_request_and_options() {
        let factory = Arc::new(FakeEngineFactory::new(vec![]));
        let manager = InstallManager::with_config(
            factory.clone(),
            InstallerConfig {
                max_module_retries: 4,
                ..Default::default()
            },
        );
        manager
            .install(InstallRequest::new(SessionId(9), "https://cdn/x", "/tmp/t", "/tmp/d"))
            .await
            .unwrap();

        let requests = factory.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].source_url, "https://cdn/x");
        assert_eq!(requests[0].dest_dir, PathBuf::from("/tmp/d"));
        assert_eq!(requests[0].options.temporary_directory, PathBuf::from("/tmp/t"));
        assert_eq!(requests[0].options.max_module_retries, 4);
    }

    #[tokio::test]
    async fn session_is_registered_only_while_running() {
        let (manager, _) = manager_with(FakeEngineFactory::new(vec![
            Step::Emit(LifecycleEvent::download_started(None)),
            Step::WaitForCancel,
        ]));
        let mut rx = manager.subscribe();

        let task = {
            let m = manager.clone();
            tokio::spawn(async move { m.install(request(5, "https://a")).await })
        };
        started(&mut rx, SessionId(5)).await;
        assert!(manager.is_active(SessionId(5)));
        assert_eq!(manager.active_sessions(), vec![SessionId(5)]);

        manager.cancel(SessionId(5));
        assert_eq!(task.await.unwrap().unwrap(), InstallOutcome::Cancelled);
        assert!(!manager.is_active(SessionId(5)));
    }

    #[tokio::test]
    async fn duplicate_active_session_is_rejected() {
        let (manager, _) = manager_with(FakeEngineFactory::new(vec![
            Step::Emit(LifecycleEvent::download_started(None)),
            Step::WaitForCancel,
        ]));
        let mut rx = manager.subscribe();

        let first = {
            let m = manager.clone();
            tokio::spawn(async move { m.install(request(6, "https://a")).await })
        };
        started(&mut rx, SessionId(6)).await;

        let err = manager.install(request(6, "https://b")).await.unwrap_err();
        assert_eq!(
            err,
            InstallError::Session(SessionError::AlreadyActive {
                session_id: SessionId(6)
            })
        );
        // The rejected attempt did not disturb the running session.
        assert!(manager.is_active(SessionId(6)));

        manager.cancel(SessionId(6));
        assert!(first.await.unwrap().unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn dropped_install_future_releases_session() {
        let (manager, _) = manager_with(FakeEngineFactory::new(vec![Step::WaitForCancel]));
        let result = tokio::time::timeout(
            Duration::from_millis(20),
            manager.install(request(8, "https://a")),
        )
        .await;
        assert!(result.is_err());
        assert!(!manager.is_active(SessionId(8)));
    }

    // ---------------------------------------------------------------
    // Cancellation
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn cancel_unknown_session_is_noop() {
        let (manager, _) = manager_with(FakeEngineFactory::new(vec![]));
        manager.cancel(SessionId(404));
        assert!(manager.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn cancel_after_completion_is_noop() {
        let (manager, _) = manager_with(FakeEngineFactory::new(vec![]));
        assert!(manager.install(request(1, "https://a")).await.unwrap().is_success());
        manager.cancel(SessionId(1));
        manager.cancel(SessionId(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn repeated_concurrent_cancels_resolve_once() {
        let (manager, _) = manager_with(FakeEngineFactory::new(vec![
            Step::Emit(LifecycleEvent::download_started(None)),
            Step::WaitForCancel,
        ]));
        let mut rx = manager.subscribe();
        let task = {
            let m = manager.clone();
            tokio::spawn(async move { m.install(request(11, "https://a")).await })
        };
        started(&mut rx, SessionId(11)).await;

        let cancels: Vec<_> = (0..8)
            .map(|_| {
                let m = manager.clone();
                tokio::spawn(async move { m.cancel(SessionId(11)) })
            })
            .collect();
        for c in cancels {
            c.await.unwrap();
        }

        assert_eq!(task.await.unwrap().unwrap(), InstallOutcome::Cancelled);
    }

    #[tokio::test]
    async fn cancel_observed_at_next_checkpoint() {
        let factory = FakeEngineFactory::new(vec![
            Step::Emit(LifecycleEvent::download_started(Some("base"))),
            Step::Sleep(Duration::from_millis(200)),
            Step::Emit(LifecycleEvent::download_finished(Some("base"))),
            Step::Checkpoint,
            Step::Emit(LifecycleEvent::unzip_started(Some("base"))),
        ]);
        let (manager, observer) = manager_with(factory);
        let mut rx = manager.subscribe();

        let task = {
            let m = manager.clone();
            tokio::spawn(async move { m.install(request(12, "https://a")).await })
        };
        started(&mut rx, SessionId(12)).await;
        manager.cancel(SessionId(12));

        assert_eq!(task.await.unwrap().unwrap(), InstallOutcome::Cancelled);
        // In-flight phase finished; nothing after the checkpoint ran.
        assert_eq!(
            observer.kinds_for(SessionId(12)),
            vec![EventKind::DownloadStarted, EventKind::DownloadFinished]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_cancel_and_throttle_independently() {
        let mut a_steps = vec![Step::Emit(LifecycleEvent::download_progress(None, 1, Some(4)))];
        a_steps.push(Step::WaitForCancel);

        let mut b_steps = vec![Step::Emit(LifecycleEvent::download_progress(None, 1, Some(4)))];
        b_steps.push(Step::Sleep(Duration::from_millis(10)));
        b_steps.push(Step::Emit(LifecycleEvent::download_progress(None, 2, Some(4))));
        b_steps.push(Step::Sleep(Duration::from_millis(50)));
        b_steps.push(Step::Emit(LifecycleEvent::download_progress(None, 3, Some(4))));

        let factory = FakeEngineFactory::new(vec![])
            .with_script("https://a", a_steps)
            .with_script("https://b", b_steps);
        let (manager, observer) = manager_with(factory);
        let mut rx = manager.subscribe();

        let a = {
            let m = manager.clone();
            tokio::spawn(async move { m.install(request(21, "https://a")).await })
        };
        started(&mut rx, SessionId(21)).await;
        let b = {
            let m = manager.clone();
            tokio::spawn(async move { m.install(request(22, "https://b")).await })
        };

        manager.cancel(SessionId(21));
        assert!(a.await.unwrap().unwrap().is_cancelled());
        assert!(b.await.unwrap().unwrap().is_success());

        // A's progress did not hold back B's first event; B's second was
        // inside its own window and dropped.
        assert_eq!(observer.kinds_for(SessionId(21)), vec![EventKind::DownloadProgress]);
        assert_eq!(
            observer.kinds_for(SessionId(22)),
            vec![EventKind::DownloadProgress, EventKind::DownloadProgress]
        );
    }

    // ---------------------------------------------------------------
    // Event relaying
    // ---------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn progress_burst_is_throttled_and_phases_pass() {
        let (manager, observer) = manager_with(FakeEngineFactory::new(module_steps("base", 100)));
        manager.install(request(30, "https://a")).await.unwrap();

        let kinds = observer.kinds_for(SessionId(30));
        let progress = kinds
            .iter()
            .filter(|k| **k == EventKind::DownloadProgress)
            .count();
        assert_eq!(progress, 1, "burst within one interval yields one event");
        assert_eq!(kinds.len(), 7);
        assert_eq!(kinds.first(), Some(&EventKind::DownloadStarted));
        assert_eq!(kinds.last(), Some(&EventKind::CopyFinished));
    }

    #[tokio::test]
    async fn non_progress_events_delivered_once_in_order() {
        let script = vec![
            Step::Emit(LifecycleEvent::log_info(Some("base"), "resolving manifest")),
            Step::Emit(LifecycleEvent::download_started(Some("base"))),
            Step::Emit(LifecycleEvent::RetryScheduled(crate::events::RetryScheduledPayload {
                module: Some("base".into()),
                retry_count: 1,
                wait_seconds: 0.0,
            })),
            Step::Emit(LifecycleEvent::RetryStarted(crate::events::RetryStartedPayload {
                module: Some("base".into()),
                retry_count: 1,
            })),
            Step::Emit(LifecycleEvent::download_finished(Some("base"))),
            Step::Emit(LifecycleEvent::log_warn(None, "slow mirror")),
            Step::Emit(LifecycleEvent::log_error(None, "checksum retry")),
        ];
        let expected: Vec<EventKind> = script
            .iter()
            .filter_map(|s| match s {
                Step::Emit(e) => Some(e.kind()),
                _ => None,
            })
            .collect();

        let (manager, observer) = manager_with(FakeEngineFactory::new(script));
        manager.install(request(31, "https://a")).await.unwrap();
        assert_eq!(observer.kinds_for(SessionId(31)), expected);
    }

    #[tokio::test]
    async fn channel_subscriber_sees_tagged_events() {
        let (manager, _) = manager_with(FakeEngineFactory::new(vec![Step::Emit(
            LifecycleEvent::log_info(None, "hello"),
        )]));
        let mut rx = manager.subscribe();
        manager.install(request(40, "https://a")).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id, SessionId(40));
        assert_eq!(event.kind(), EventKind::LogInfo);
    }

    // ---------------------------------------------------------------
    // Uninstall
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn uninstall_uses_configured_reserved_entry() {
        let root = tempfile::tempdir().unwrap();
        let primary = root.path().join("addon");
        let cache = root.path().join("cache");
        std::fs::create_dir_all(&primary).unwrap();
        std::fs::create_dir_all(cache.join("work")).unwrap();
        std::fs::write(cache.join("fileA"), b"a").unwrap();
        std::fs::write(cache.join("fileB"), b"b").unwrap();

        let (manager, _) = manager_with(FakeEngineFactory::new(vec![]));
        let report = manager.uninstall(&primary, &[cache.clone()]).await.unwrap();

        assert!(report.primary_removed);
        assert!(!primary.exists());
        let left: Vec<_> = std::fs::read_dir(&cache)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("work")]);
    }
}

//! addon-installer: cancellable, throttled install orchestration for addons.
//!
//! This crate drives one long-running download-and-deploy operation per
//! install session. The actual download/unzip/copy work belongs to an
//! external install engine; this crate owns session lifecycle, cooperative
//! cancellation, progress throttling, outcome classification, and uninstall
//! cleanup of cached artifacts.
//!
//! # Crate Organization
//!
//! - `events` -- Closed lifecycle event taxonomy and session envelope
//! - `errors` -- All error types (EngineError, InstallError, CleanupError, ...)
//! - `models` -- SessionId, InstallOutcome, InstallRequest, CleanupReport
//! - `config` -- InstallerConfig (TOML/JSON loadable)
//! - `cancellation` -- One-shot CancellationToken
//! - `registry` -- SessionRegistry and scoped SessionGuard
//! - `throttle` -- Per-session progress rate limiting
//! - `observer` -- Observer fan-out and per-session EventSink
//! - `engine` -- Install engine contract
//! - `orchestrator` -- InstallManager: install, cancel, uninstall
//! - `cleanup` -- Uninstall filesystem routine
//! - `status` -- UI-facing status derived from events
//! - `testing` -- Scripted engine and recording observer

pub mod cancellation;
pub mod cleanup;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod models;
pub mod observer;
pub mod orchestrator;
pub mod registry;
pub mod status;
pub mod testing;
pub mod throttle;

pub use cancellation::CancellationToken;
pub use config::InstallerConfig;
pub use engine::{EngineFactory, EngineRequest, InstallEngine};
pub use errors::{CleanupError, EngineError, EngineErrorKind, InstallError, InstallerError};
pub use events::{EventKind, LifecycleEvent, SessionEvent};
pub use models::{CleanupReport, InstallOutcome, InstallRequest, SessionId};
pub use observer::{EventSink, InstallObserver, ObserverRegistry};
pub use orchestrator::InstallManager;
pub use status::{InstallState, InstallStatus, StatusTracker};

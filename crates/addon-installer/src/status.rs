//! UI-facing install status derived from session events.
//!
//! [`StatusTracker`] is an observer that folds each session's events into
//! an [`InstallState`], so the presentation layer can read one value per
//! session instead of replaying the event stream. Rendering stays outside
//! this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::events::{LifecycleEvent, SessionEvent};
use crate::models::{InstallOutcome, SessionId};
use crate::observer::InstallObserver;

/// Install status of one addon as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    NotInstalled,
    NeedsUpdate,
    UpToDate,
    /// Destination is a git checkout; managed outside the installer.
    GitInstall,
    /// Installed from a different release track than the one selected.
    TrackSwitch,
    InstallingDependency,
    DownloadPrep,
    Downloading,
    Decompressing,
    /// Copying into the destination.
    DownloadEnding,
    DownloadDone,
    DownloadRetry,
    DownloadError,
    DownloadCanceled,
    #[default]
    Unknown,
}

impl InstallStatus {
    /// Whether a cancel request can still take effect.
    ///
    /// Unzip and copy run to completion once started, so only the download
    /// phases are cancellable.
    pub fn allows_cancel(&self) -> bool {
        matches!(self, Self::Downloading | Self::InstallingDependency)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::InstallingDependency
                | Self::DownloadPrep
                | Self::Downloading
                | Self::Decompressing
                | Self::DownloadEnding
                | Self::DownloadRetry
        )
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, Self::DownloadDone | Self::UpToDate | Self::GitInstall)
    }
}

/// Snapshot of one session's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallState {
    pub status: InstallStatus,
    /// Last relayed download percentage, cleared when downloading ends.
    pub percent: Option<u8>,
    /// Module of the most recent phase event.
    pub module: Option<String>,
}

impl InstallState {
    /// Fold one event into the state.
    pub fn apply(&mut self, event: &LifecycleEvent) {
        if let Some(module) = event.module() {
            self.module = Some(module.to_string());
        }
        match event {
            LifecycleEvent::DownloadStarted(_) | LifecycleEvent::RetryStarted(_) => {
                self.status = InstallStatus::Downloading;
                self.percent = Some(0);
            }
            LifecycleEvent::FullDownload(_) => {
                self.status = InstallStatus::Downloading;
            }
            LifecycleEvent::DownloadProgress(p) => {
                self.status = InstallStatus::Downloading;
                self.percent = Some(p.progress.percent);
            }
            LifecycleEvent::DownloadFinished(_) => {
                self.percent = None;
            }
            LifecycleEvent::UnzipStarted(_) => {
                self.status = InstallStatus::Decompressing;
                self.percent = None;
            }
            LifecycleEvent::CopyStarted(_) => {
                self.status = InstallStatus::DownloadEnding;
            }
            LifecycleEvent::RetryScheduled(_) => {
                self.status = InstallStatus::DownloadRetry;
                self.percent = None;
            }
            LifecycleEvent::Error(_) => {
                self.status = InstallStatus::DownloadError;
            }
            LifecycleEvent::UnzipFinished(_)
            | LifecycleEvent::CopyFinished(_)
            | LifecycleEvent::LogInfo(_)
            | LifecycleEvent::LogWarn(_)
            | LifecycleEvent::LogError(_) => {}
        }
    }

    /// Apply the session's terminal outcome.
    pub fn finish(&mut self, outcome: &InstallOutcome) {
        self.percent = None;
        self.status = match outcome {
            InstallOutcome::Success => InstallStatus::DownloadDone,
            InstallOutcome::ClassifiedFailure { .. } => InstallStatus::DownloadError,
            InstallOutcome::Cancelled => InstallStatus::DownloadCanceled,
        };
    }
}

/// Observer keeping an [`InstallState`] per session.
pub struct StatusTracker {
    states: Mutex<HashMap<SessionId, InstallState>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Mark a session as preparing, before the engine raises anything.
    pub fn begin(&self, session_id: SessionId) {
        self.states.lock().unwrap().insert(
            session_id,
            InstallState {
                status: InstallStatus::DownloadPrep,
                ..Default::default()
            },
        );
    }

    pub fn state(&self, session_id: SessionId) -> Option<InstallState> {
        self.states.lock().unwrap().get(&session_id).cloned()
    }

    pub fn status(&self, session_id: SessionId) -> InstallStatus {
        self.state(session_id)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// Record the value `install` resolved to.
    pub fn finish(&self, session_id: SessionId, outcome: &InstallOutcome) {
        self.states
            .lock()
            .unwrap()
            .entry(session_id)
            .or_default()
            .finish(outcome);
    }

    /// Forget a session (e.g. after the UI acknowledged the result).
    pub fn clear(&self, session_id: SessionId) -> Option<InstallState> {
        self.states.lock().unwrap().remove(&session_id)
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallObserver for StatusTracker {
    fn on_event(&self, event: &SessionEvent) {
        self.states
            .lock()
            .unwrap()
            .entry(event.session_id)
            .or_default()
            .apply(&event.event);
    }
}

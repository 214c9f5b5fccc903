//! Lifecycle events raised by the install engine and relayed to observers.
//!
//! The engine reports every phase of an install through a fixed set of
//! event kinds. The set is closed: [`LifecycleEvent`] enumerates every kind
//! together with its payload, and [`EventKind`] is the payload-free
//! discriminant used for filtering and throttling.
//!
//! # Kinds
//!
//! | Kind               | Phase     | Payload                                  |
//! |--------------------|-----------|------------------------------------------|
//! | `error`            | any       | [`EngineError`]                          |
//! | `downloadStarted`  | download  | module                                   |
//! | `downloadProgress` | download  | module, [`DownloadProgress`]             |
//! | `downloadFinished` | download  | module                                   |
//! | `unzipStarted`     | unzip     | module                                   |
//! | `unzipFinished`    | unzip     | module                                   |
//! | `copyStarted`      | copy      | module                                   |
//! | `copyFinished`     | copy      | module                                   |
//! | `retryScheduled`   | retry     | module, retry count, wait in seconds     |
//! | `retryStarted`     | retry     | module, retry count                      |
//! | `fullDownload`     | download  | reason                                   |
//! | `logInfo`          | log       | module, message                          |
//! | `logWarn`          | log       | module, message                          |
//! | `logError`         | log       | module, message                          |
//!
//! On the wire an event is `{ "kind": "<kind>", "payload": { ... } }`; the
//! [`SessionEvent`] envelope adds `sessionId` and `timestamp`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::models::SessionId;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Payload-free discriminant of a [`LifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Error,
    DownloadStarted,
    DownloadProgress,
    DownloadFinished,
    UnzipStarted,
    UnzipFinished,
    CopyStarted,
    CopyFinished,
    RetryScheduled,
    RetryStarted,
    FullDownload,
    LogInfo,
    LogWarn,
    LogError,
}

impl EventKind {
    /// Wire name of the kind (e.g. `"downloadProgress"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::DownloadStarted => "downloadStarted",
            Self::DownloadProgress => "downloadProgress",
            Self::DownloadFinished => "downloadFinished",
            Self::UnzipStarted => "unzipStarted",
            Self::UnzipFinished => "unzipFinished",
            Self::CopyStarted => "copyStarted",
            Self::CopyFinished => "copyFinished",
            Self::RetryScheduled => "retryScheduled",
            Self::RetryStarted => "retryStarted",
            Self::FullDownload => "fullDownload",
            Self::LogInfo => "logInfo",
            Self::LogWarn => "logWarn",
            Self::LogError => "logError",
        }
    }

    /// Whether events of this kind are rate-limited before delivery.
    pub fn is_high_frequency(&self) -> bool {
        matches!(self, Self::DownloadProgress)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every event kind, in the order the engine documents them.
pub const ALL_KINDS: &[EventKind] = &[
    EventKind::Error,
    EventKind::DownloadStarted,
    EventKind::DownloadProgress,
    EventKind::DownloadFinished,
    EventKind::UnzipStarted,
    EventKind::UnzipFinished,
    EventKind::CopyStarted,
    EventKind::CopyFinished,
    EventKind::RetryScheduled,
    EventKind::RetryStarted,
    EventKind::FullDownload,
    EventKind::LogInfo,
    EventKind::LogWarn,
    EventKind::LogError,
];

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Byte-level progress of a module download.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Bytes received so far.
    pub loaded: u64,
    /// Total bytes expected, when the server reported a length.
    pub total: Option<u64>,
    /// Completion percentage in `0..=100`.
    pub percent: u8,
}

impl DownloadProgress {
    /// Build a progress value, deriving `percent` from `loaded / total`.
    pub fn new(loaded: u64, total: Option<u64>) -> Self {
        let percent = match total {
            Some(0) | None => 0,
            Some(total) => ((loaded.min(total) * 100) / total) as u8,
        };
        Self {
            loaded,
            total,
            percent,
        }
    }
}

/// Payload for events that only name the module they concern.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModulePhase {
    /// `None` for whole-package phases.
    pub module: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub module: Option<String>,
    pub progress: DownloadProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryScheduledPayload {
    pub module: Option<String>,
    pub retry_count: u32,
    pub wait_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStartedPayload {
    pub module: Option<String>,
    pub retry_count: u32,
}

/// Why the engine fell back to downloading the full package instead of
/// individual modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullDownloadPayload {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    pub module: Option<String>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

/// One event raised by the install engine.
///
/// Events are immutable once emitted. For a single module, download events
/// precede unzip events, which precede copy events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum LifecycleEvent {
    Error(EngineError),
    DownloadStarted(ModulePhase),
    DownloadProgress(ProgressPayload),
    DownloadFinished(ModulePhase),
    UnzipStarted(ModulePhase),
    UnzipFinished(ModulePhase),
    CopyStarted(ModulePhase),
    CopyFinished(ModulePhase),
    RetryScheduled(RetryScheduledPayload),
    RetryStarted(RetryStartedPayload),
    FullDownload(FullDownloadPayload),
    LogInfo(LogPayload),
    LogWarn(LogPayload),
    LogError(LogPayload),
}

impl LifecycleEvent {
    /// The discriminant of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Error(_) => EventKind::Error,
            Self::DownloadStarted(_) => EventKind::DownloadStarted,
            Self::DownloadProgress(_) => EventKind::DownloadProgress,
            Self::DownloadFinished(_) => EventKind::DownloadFinished,
            Self::UnzipStarted(_) => EventKind::UnzipStarted,
            Self::UnzipFinished(_) => EventKind::UnzipFinished,
            Self::CopyStarted(_) => EventKind::CopyStarted,
            Self::CopyFinished(_) => EventKind::CopyFinished,
            Self::RetryScheduled(_) => EventKind::RetryScheduled,
            Self::RetryStarted(_) => EventKind::RetryStarted,
            Self::FullDownload(_) => EventKind::FullDownload,
            Self::LogInfo(_) => EventKind::LogInfo,
            Self::LogWarn(_) => EventKind::LogWarn,
            Self::LogError(_) => EventKind::LogError,
        }
    }

    /// The module this event concerns, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::DownloadStarted(p)
            | Self::DownloadFinished(p)
            | Self::UnzipStarted(p)
            | Self::UnzipFinished(p)
            | Self::CopyStarted(p)
            | Self::CopyFinished(p) => p.module.as_deref(),
            Self::DownloadProgress(p) => p.module.as_deref(),
            Self::RetryScheduled(p) => p.module.as_deref(),
            Self::RetryStarted(p) => p.module.as_deref(),
            Self::LogInfo(p) | Self::LogWarn(p) | Self::LogError(p) => p.module.as_deref(),
            Self::Error(_) | Self::FullDownload(_) => None,
        }
    }

    // -- Constructors used by engines ---

    pub fn download_started(module: Option<&str>) -> Self {
        Self::DownloadStarted(ModulePhase::named(module))
    }

    pub fn download_progress(module: Option<&str>, loaded: u64, total: Option<u64>) -> Self {
        Self::DownloadProgress(ProgressPayload {
            module: module.map(str::to_string),
            progress: DownloadProgress::new(loaded, total),
        })
    }

    pub fn download_finished(module: Option<&str>) -> Self {
        Self::DownloadFinished(ModulePhase::named(module))
    }

    pub fn unzip_started(module: Option<&str>) -> Self {
        Self::UnzipStarted(ModulePhase::named(module))
    }

    pub fn unzip_finished(module: Option<&str>) -> Self {
        Self::UnzipFinished(ModulePhase::named(module))
    }

    pub fn copy_started(module: Option<&str>) -> Self {
        Self::CopyStarted(ModulePhase::named(module))
    }

    pub fn copy_finished(module: Option<&str>) -> Self {
        Self::CopyFinished(ModulePhase::named(module))
    }

    pub fn log_info(module: Option<&str>, message: impl Into<String>) -> Self {
        Self::LogInfo(LogPayload {
            module: module.map(str::to_string),
            message: message.into(),
        })
    }

    pub fn log_warn(module: Option<&str>, message: impl Into<String>) -> Self {
        Self::LogWarn(LogPayload {
            module: module.map(str::to_string),
            message: message.into(),
        })
    }

    pub fn log_error(module: Option<&str>, message: impl Into<String>) -> Self {
        Self::LogError(LogPayload {
            module: module.map(str::to_string),
            message: message.into(),
        })
    }
}

impl ModulePhase {
    fn named(module: Option<&str>) -> Self {
        Self {
            module: module.map(str::to_string),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// A lifecycle event tagged with the session that produced it.
///
/// This is the `(sessionId, eventKind, payload)` tuple delivered to
/// observers and channel subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub event: LifecycleEvent,
    /// Stamped when the event is relayed, not when the engine raised it.
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(session_id: SessionId, event: LifecycleEvent) -> Self {
        Self {
            session_id,
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

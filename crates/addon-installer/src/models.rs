//! Core data models shared by the orchestrator, engine contract, and cleanup.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Caller-chosen identifier of an install session.
///
/// Unique among concurrently active sessions; ids may be reused once a
/// session resolves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// InstallOutcome
// ---------------------------------------------------------------------------

/// Terminal result of an install that did not raise.
///
/// Unclassified engine failures are not an outcome; they are raised as
/// [`InstallError::Unclassified`](crate::errors::InstallError::Unclassified).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallOutcome {
    Success,
    /// The engine recognized the failure; render a normal error state.
    ClassifiedFailure { error: EngineError },
    /// The session was cancelled before the engine finished.
    Cancelled,
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The classified error, if this outcome is a failure.
    pub fn error(&self) -> Option<&EngineError> {
        match self {
            Self::ClassifiedFailure { error } => Some(error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// InstallRequest / EngineOptions
// ---------------------------------------------------------------------------

/// What to install and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub session_id: SessionId,
    /// Locates the versioned artifact manifest.
    pub source_url: String,
    /// Scratch space for downloads; created by the engine if absent.
    pub temp_dir: PathBuf,
    /// Final install location; created by the engine if absent.
    pub dest_dir: PathBuf,
}

impl InstallRequest {
    pub fn new(
        session_id: impl Into<SessionId>,
        source_url: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
        dest_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            source_url: source_url.into(),
            temp_dir: temp_dir.into(),
            dest_dir: dest_dir.into(),
        }
    }
}

/// Tuning handed to the engine at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub temporary_directory: PathBuf,
    /// Retries per module before the engine gives up with `MaxModuleRetries`.
    pub max_module_retries: u32,
}

// ---------------------------------------------------------------------------
// CleanupReport
// ---------------------------------------------------------------------------

/// What an uninstall removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// `false` when the primary directory was already absent.
    pub primary_removed: bool,
    /// Cache entries deleted, in deletion order.
    pub removed_entries: Vec<PathBuf>,
}

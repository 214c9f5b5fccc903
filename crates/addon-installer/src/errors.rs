//! Error types for the install orchestrator.
//!
//! This module defines the full error taxonomy:
//!
//! - [`EngineError`] -- failure reported by the install engine, carrying an
//!   [`EngineErrorKind`] discriminant
//! - [`InstallError`] -- failures `install` raises instead of returning
//! - [`SessionError`] -- session bookkeeping errors
//! - [`CleanupError`] -- filesystem errors during uninstall
//! - [`ConfigError`] -- configuration loading errors
//! - [`InstallerError`] -- top-level enum wrapping all of the above
//!
//! All types derive `Serialize` so errors can cross a JSON boundary to the
//! UI process.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::SessionId;

/// Prefix marking a textual engine error as a recognized condition.
pub const CLASSIFIED_MARKER: &str = "FragmenterError";

// -- EngineErrorKind --

/// Conditions the install engine recognizes and reports as ordinary
/// failures, plus [`EngineErrorKind::Unclassified`] for everything else.
///
/// | Kind                | Meaning                                           |
/// |---------------------|---------------------------------------------------|
/// | `PermissionsError`  | Destination or temp directory not writable        |
/// | `NoSpaceOnDevice`   | Disk full while downloading or extracting         |
/// | `MaxModuleRetries`  | A module kept failing after all retries           |
/// | `FileNotFound`      | Expected file missing from the artifact           |
/// | `DirectoryNotEmpty` | Destination could not be replaced                 |
/// | `NotADirectory`     | A path component is a file                        |
/// | `ModuleJsonInvalid` | Artifact manifest could not be parsed             |
/// | `ModuleCrcMismatch` | Downloaded module failed its checksum             |
/// | `UserAborted`       | The cancellation signal was observed              |
/// | `NetworkError`      | Transport failure of a known shape                |
/// | `CorruptedZipFile`  | Archive could not be extracted                    |
/// | `Unknown`           | Recognized by the engine, code not reported       |
/// | `Unclassified`      | Not recognized by the engine; a defect            |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineErrorKind {
    PermissionsError,
    NoSpaceOnDevice,
    MaxModuleRetries,
    FileNotFound,
    DirectoryNotEmpty,
    NotADirectory,
    ModuleJsonInvalid,
    ModuleCrcMismatch,
    UserAborted,
    NetworkError,
    CorruptedZipFile,
    Unknown,
    Unclassified,
}

impl EngineErrorKind {
    const CODES: &'static [EngineErrorKind] = &[
        Self::PermissionsError,
        Self::NoSpaceOnDevice,
        Self::MaxModuleRetries,
        Self::FileNotFound,
        Self::DirectoryNotEmpty,
        Self::NotADirectory,
        Self::ModuleJsonInvalid,
        Self::ModuleCrcMismatch,
        Self::UserAborted,
        Self::NetworkError,
        Self::CorruptedZipFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionsError => "PermissionsError",
            Self::NoSpaceOnDevice => "NoSpaceOnDevice",
            Self::MaxModuleRetries => "MaxModuleRetries",
            Self::FileNotFound => "FileNotFound",
            Self::DirectoryNotEmpty => "DirectoryNotEmpty",
            Self::NotADirectory => "NotADirectory",
            Self::ModuleJsonInvalid => "ModuleJsonInvalid",
            Self::ModuleCrcMismatch => "ModuleCrcMismatch",
            Self::UserAborted => "UserAborted",
            Self::NetworkError => "NetworkError",
            Self::CorruptedZipFile => "CorruptedZipFile",
            Self::Unknown => "Unknown",
            Self::Unclassified => "Unclassified",
        }
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- EngineError --

/// A failure reported by the install engine.
///
/// Classification is decided by [`kind`](Self::kind) alone; the message is
/// for display.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// An error the engine does not recognize.
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Unclassified, message)
    }

    /// The error an engine raises after observing cancellation.
    pub fn aborted() -> Self {
        Self::new(EngineErrorKind::UserAborted, "install aborted by user")
    }

    /// Build an error from an engine that only reports text.
    ///
    /// Messages carrying the [`CLASSIFIED_MARKER`] prefix are classified;
    /// a known code following the marker (`"FragmenterError: NetworkError ..."`)
    /// selects that kind, otherwise the kind is `Unknown`. Any other message
    /// is `Unclassified`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match message.strip_prefix(CLASSIFIED_MARKER) {
            Some(rest) => {
                let rest = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
                EngineErrorKind::CODES
                    .iter()
                    .copied()
                    .find(|code| rest.starts_with(code.as_str()))
                    .unwrap_or(EngineErrorKind::Unknown)
            }
            None => EngineErrorKind::Unclassified,
        };
        Self { kind, message }
    }

    /// Whether the engine recognized this failure.
    pub fn is_classified(&self) -> bool {
        self.kind != EngineErrorKind::Unclassified
    }

    pub fn is_abort(&self) -> bool {
        self.kind == EngineErrorKind::UserAborted
    }
}

// -- SessionError --

/// Session bookkeeping errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum SessionError {
    /// Another install with the same id has not resolved yet.
    #[error("session {session_id} is already active")]
    AlreadyActive { session_id: SessionId },
}

// -- InstallError --

/// Failures `install` raises rather than returning as an outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum InstallError {
    /// An engine failure the engine itself did not recognize.
    #[error("unclassified install failure: {0}")]
    Unclassified(EngineError),

    /// The session could not be started.
    #[error(transparent)]
    Session(#[from] SessionError),
}

// -- CleanupError --

/// Filesystem errors during uninstall.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum CleanupError {
    #[error("failed to remove {path}: {message}")]
    Io { path: String, message: String },
}

impl CleanupError {
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

// -- ConfigError --

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum ConfigError {
    #[error("invalid config: {message}")]
    Parse { message: String },

    #[error("invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

// -- InstallerError --

/// Top-level error enum wrapping all component errors.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
pub enum InstallerError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

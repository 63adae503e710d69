//! Error types for albumshift.
//!
//! Errors are split by scope. Unit-scoped problems (`BuildError`, `ImportFailure`)
//! are recorded against a single unit in the plan and never end a run. Run-scoped
//! problems (`StoreError`, `MigrateError`) end the run with a non-zero exit.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Problems with the persisted plan. Always fatal for the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No plan found at {0}")]
    NotFound(PathBuf),

    #[error("A plan already exists at {0} (use --force to replace it)")]
    AlreadyExists(PathBuf),

    #[error("Plan at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Plan at {0} is locked by another run")]
    Locked(PathBuf),

    #[error("Unit {unit_id} is not part of the plan")]
    UnknownUnit { unit_id: String },

    #[error("Catalog lists unit {unit_id} more than once")]
    DuplicateUnit { unit_id: String },

    #[error("Refusing to update unit {unit_id}: {message}")]
    InvalidTransition { unit_id: String, message: String },

    #[error("IO error at {path}: {message}")]
    Io {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl StoreError {
    pub(crate) fn io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        StoreError::Io {
            message: err.to_string(),
            path: path.into(),
            source: Some(err),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        StoreError::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A problem with a single export entry. Downgraded to a Skipped unit or a note.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("unreadable export entry: {message}")]
    Unreadable { message: String },

    #[error("file name {file_name:?} does not carry a photo id")]
    UnrecognizedName { file_name: String },

    #[error("listed in album(s) {albums:?} but no media file found")]
    MissingMedia { albums: Vec<String> },

    #[error("duplicate unit id {unit_id} (already assigned to {existing})")]
    DuplicateUnit { unit_id: String, existing: PathBuf },

    #[error("sidecar {path} rejected: {message}")]
    Sidecar { path: PathBuf, message: String },
}

/// How a single import attempt went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The destination raised an explicit fault.
    Fault,
    /// The destination returned without confirming success.
    NoResult,
    /// The attempt ran past its time budget.
    Timeout,
    /// The destination reported itself wedged.
    Unresponsive,
    /// The source file disappeared between planning and execution.
    SourceMissing,
}

impl FailureKind {
    /// Failures that indicate the destination process itself is degraded.
    pub fn is_unresponsive(self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::Unresponsive)
    }

    /// Whether another attempt at the same unit could plausibly succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::SourceMissing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Fault => "fault",
            FailureKind::NoResult => "no-result",
            FailureKind::Timeout => "timeout",
            FailureKind::Unresponsive => "unresponsive",
            FailureKind::SourceMissing => "source-missing",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single failure type that leaves the fault isolator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ImportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ImportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(budget: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("no answer within {:?}", budget),
        )
    }
}

/// Main error type for run-level failures.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No plan at {0}; run `albumshift plan` first")]
    NoPlan(PathBuf),

    #[error("Export root {0} is not a directory")]
    InvalidExportRoot(PathBuf),

    #[error("Run aborted: {0}")]
    Aborted(String),

    #[error("Invalid configuration for {field}: {message}")]
    Config { field: String, message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for albumshift operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

impl From<std::io::Error> for MigrateError {
    fn from(err: std::io::Error) -> Self {
        MigrateError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        MigrateError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MigrateError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MigrateError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Process exit code for this error.
    ///
    /// - 2: missing or untrustworthy plan state, or bad input
    /// - 3: run aborted mid-way
    /// - 1: anything else
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Store(_)
            | MigrateError::NoPlan(_)
            | MigrateError::InvalidExportRoot(_)
            | MigrateError::Config { .. } => 2,
            MigrateError::Aborted(_) => 3,
            _ => 1,
        }
    }
}

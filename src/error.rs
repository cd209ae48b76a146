// src/error.rs
//! Application error types with structured error handling.
//!
//! Each layer owns its failure vocabulary: fetch, decode and storage errors
//! are contained per task, while `AppError` is what ends a run or a command.

use crate::pipeline::RunSummary;
use std::fmt;
use thiserror::Error;

/// Why a fetch ultimately failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Non-retryable: a 4xx other than 408/429, or a body that is not JSON.
    Rejected,
    /// Every attempt hit a transient failure.
    Exhausted,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Rejected => write!(f, "rejected"),
            FetchErrorKind::Exhausted => write!(f, "exhausted"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Fetch of {endpoint} {kind} after {attempts} attempt(s){}: {message}", status_suffix(*.status))]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub endpoint: String,
    pub status: Option<u16>,
    pub attempts: u32,
    pub message: String,
}

fn status_suffix(status: Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl FetchError {
    pub fn rejected(endpoint: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Rejected,
            endpoint: endpoint.into(),
            status,
            attempts: 1,
            message: message.into(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.kind == FetchErrorKind::Rejected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    SchemaMismatch,
}

/// A payload did not have the shape its endpoint promises.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Schema mismatch at `{field}`: {reason}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    /// JSON path of the offending field, e.g. `data[3].course_name`.
    pub field: String,
    pub reason: String,
}

impl DecodeError {
    pub fn schema_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: DecodeErrorKind::SchemaMismatch,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Transaction failed{}: {source}", if *.transient { " (transient)" } else { "" })]
    TransactionFailed {
        transient: bool,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Store schema is missing table `{table}`; run the schema bootstrap first")]
    MissingSchema { table: String },

    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Join(String),
}

impl StorageError {
    pub(crate) fn from_sqlite(err: rusqlite::Error) -> Self {
        let transient = matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        );
        StorageError::TransactionFailed {
            transient,
            source: err,
        }
    }

    /// `SQLITE_BUSY` / `SQLITE_LOCKED`: worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::TransactionFailed { transient: true, .. })
    }

    /// Store-level failures end the run; row-level ones only fail the task.
    pub fn is_fatal(&self) -> bool {
        match self {
            StorageError::TransactionFailed { source, .. } => !matches!(
                source.sqlite_error_code(),
                Some(rusqlite::ErrorCode::ConstraintViolation)
                    | Some(rusqlite::ErrorCode::TypeMismatch)
                    | Some(rusqlite::ErrorCode::TooBig)
                    | Some(rusqlite::ErrorCode::DatabaseBusy)
                    | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            StorageError::MissingSchema { .. } | StorageError::Io(_) | StorageError::Join(_) => {
                true
            }
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::from_sqlite(err)
    }
}

/// Failure of a single crawl task. Contained and tallied, never fatal on its
/// own unless the storage error says so.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TaskError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Storage(e) if e.is_fatal())
    }
}

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error(transparent)]
    Validation(#[from] crate::types::ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Filesystem IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize export: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Run {} aborted: {reason}", .summary.run_id)]
    RunAborted {
        reason: String,
        summary: Box<RunSummary>,
    },
}

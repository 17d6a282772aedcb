//! Shared error types for the services crate.

use serde::Serialize;
use thiserror::Error;

use exam_core::model::{ExamSessionError, ExamSettingsError, ExamStatus};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors returned by exam lifecycle operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamError {
    #[error("failed to load questions: {0}")]
    Load(String),
    #[error("failed to submit answers: {0}")]
    Submission(String),
    #[error("cannot {operation} while the exam is {status}")]
    InvalidState {
        operation: &'static str,
        status: ExamStatus,
    },
    #[error("exam is already finishing or finished")]
    AlreadyFinalizing,
    #[error("answers from the previous attempt have not been submitted")]
    UnsubmittedAnswers,
    #[error("activation was superseded by a newer request")]
    Superseded,
    #[error("exam session has shut down")]
    Closed,
    #[error(transparent)]
    Session(#[from] ExamSessionError),
}

/// Which asynchronous step produced the failure shown to the examinee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Load,
    Submission,
    Isolation,
}

/// User-visible failure carried in the exam snapshot until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExamFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ExamFailure {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors reported by an isolation host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IsolationError {
    #[error("lock-down was denied: {0}")]
    Denied(String),
    #[error("lock-down is not supported on this host")]
    Unsupported,
}

/// Errors emitted by `ExamSettingsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsServiceError {
    #[error(transparent)]
    Settings(#[from] ExamSettingsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Settings(#[from] SettingsServiceError),
}

//! Error types shared by the runner crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{JobId, JobStatus, JobType};

/// Errors returned by runner operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} is {status}")]
    InvalidState { id: JobId, status: JobStatus },

    #[error("A handler is already registered for job type: {0}")]
    HandlerAlreadyRegistered(JobType),

    #[error("Worker error: {0}")]
    Worker(String),
}

/// Why a handler attempt did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerErrorKind {
    /// The handler raised an ordinary error.
    Failed,
    /// A collaborator the handler depends on is not available.
    NotConfigured,
    /// No handler is bound to the job type.
    NoHandler,
    /// The attempt exceeded its deadline.
    TimedOut,
    /// The job was cancelled while the attempt was in flight.
    Cancelled,
}

impl HandlerErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerErrorKind::Failed => "failed",
            HandlerErrorKind::NotConfigured => "not_configured",
            HandlerErrorKind::NoHandler => "no_handler",
            HandlerErrorKind::TimedOut => "timed_out",
            HandlerErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Failure of a single handler attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct HandlerError {
    pub kind: HandlerErrorKind,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: HandlerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorKind::Failed, message)
    }

    pub fn not_configured(what: &str) -> Self {
        Self::new(
            HandlerErrorKind::NotConfigured,
            format!("{what} is not configured"),
        )
    }

    pub fn no_handler(job_type: JobType) -> Self {
        Self::new(
            HandlerErrorKind::NoHandler,
            format!("No handler for job type: {job_type}"),
        )
    }

    pub fn timed_out(seconds: u64) -> Self {
        Self::new(
            HandlerErrorKind::TimedOut,
            format!("Job timed out after {seconds} seconds"),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(HandlerErrorKind::Cancelled, "Job was cancelled")
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::failed(message)
    }
}

//! Core domain types for the background job runner.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus, Priority and JobType for units of work
//! - JobResult for execution outcomes
//! - RunnerConfig, RunnerStats and WorkerStatus
//! - Events for real-time updates

mod config;
mod error;
mod events;
mod job;
mod result;
mod stats;

pub use config::RunnerConfig;
pub use error::{HandlerError, HandlerErrorKind, RunnerError};
pub use events::JobEvent;
pub use job::{EnqueueRequest, Job, JobId, JobStatus, JobType, Payload, Priority};
pub use result::JobResult;
pub use stats::{RunnerStats, WorkerStatus};

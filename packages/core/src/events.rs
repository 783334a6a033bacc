//! Lifecycle events for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobStatus};

/// Events emitted by the runner as jobs move through their lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was enqueued.
    JobEnqueued { job: Job, timestamp: DateTime<Utc> },
    /// A job started executing.
    JobStarted {
        job_id: JobId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        duration_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    /// An attempt failed.
    JobFailed {
        job_id: JobId,
        error: String,
        retry_count: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A job was cancelled.
    JobCancelled {
        job_id: JobId,
        previous_status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    /// A failed job was put back in the queue by hand.
    JobRetried {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A terminal job was dropped to stay within capacity.
    JobEvicted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// The worker loop started.
    WorkerStarted { timestamp: DateTime<Utc> },
    /// The worker loop stopped.
    WorkerStopped {
        jobs_processed: u64,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::JobCancelled { timestamp, .. } => *timestamp,
            JobEvent::JobRetried { timestamp, .. } => *timestamp,
            JobEvent::JobEvicted { timestamp, .. } => *timestamp,
            JobEvent::WorkerStarted { timestamp } => *timestamp,
            JobEvent::WorkerStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobEnqueued { job, .. } => Some(job.id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::JobCancelled { job_id, .. } => Some(*job_id),
            JobEvent::JobRetried { job_id, .. } => Some(*job_id),
            JobEvent::JobEvicted { job_id, .. } => Some(*job_id),
            JobEvent::WorkerStarted { .. } | JobEvent::WorkerStopped { .. } => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued { job, .. } => {
                format!("Job {} ({}, {}) enqueued", job.id, job.job_type, job.priority)
            }
            JobEvent::JobStarted {
                job_id, attempt, ..
            } => format!("Job {} started (attempt {})", job_id, attempt),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => match duration_ms {
                Some(ms) => format!("Job {} completed in {}ms", job_id, ms),
                None => format!("Job {} completed", job_id),
            },
            JobEvent::JobFailed {
                job_id,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Job {} failed: {}{}", job_id, error, retry)
            }
            JobEvent::JobCancelled {
                job_id,
                previous_status,
                ..
            } => format!("Job {} cancelled while {}", job_id, previous_status),
            JobEvent::JobRetried { job_id, .. } => format!("Job {} requeued", job_id),
            JobEvent::JobEvicted { job_id, .. } => format!("Job {} evicted", job_id),
            JobEvent::WorkerStarted { .. } => "Worker started".to_string(),
            JobEvent::WorkerStopped { jobs_processed, .. } => {
                format!("Worker stopped after {} jobs", jobs_processed)
            }
        }
    }
}

//! Outcome records for execution attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Job, JobId, JobStatus};

/// Record of one execution attempt. At most one is kept per job; a newer
/// attempt replaces the previous record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    /// Status the job was left in by this attempt.
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub retry_count: u32,
    /// Free-form details; always carries `job_type` and `priority`.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl JobResult {
    /// Snapshot a job into a result record.
    ///
    /// `started_at` is passed separately because a requeued job has already
    /// had its own start time cleared.
    pub fn from_job(
        job: &Job,
        started_at: Option<DateTime<Utc>>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let mut metadata = Map::new();
        metadata.insert("job_type".into(), Value::from(job.job_type.as_str()));
        metadata.insert("priority".into(), Value::from(job.priority.as_str()));

        let duration_ms =
            started_at.map(|start| (completed_at - start).num_milliseconds().max(0) as u64);

        Self {
            job_id: job.id,
            status: job.status,
            result: job.result.clone(),
            error: job.error.clone(),
            started_at,
            completed_at: Some(completed_at),
            duration_ms,
            retry_count: job.retry_count,
            metadata,
        }
    }

    /// Attach an extra metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

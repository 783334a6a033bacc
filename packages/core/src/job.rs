//! Job domain types for units of work in the runner.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ulid::Ulid;

use crate::RunnerError;

/// Opaque key/value payload handed to a handler.
pub type Payload = Map<String, Value>;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a job performs, used to route it to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Report,
    Export,
    BulkImport,
    Custom,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::Report,
        JobType::Export,
        JobType::BulkImport,
        JobType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Report => "report",
            JobType::Export => "export",
            JobType::BulkImport => "bulk_import",
            JobType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RunnerError::Validation(format!("unknown job type: {s}")))
    }
}

/// Priority level for job execution order.
///
/// Variants are declared most urgent first, so the derived ordering sorts
/// `Critical` before `Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Scheduling rank, `0` being served first.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| RunnerError::Validation(format!("unknown priority: {s}")))
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to be picked up.
    #[default]
    Pending,
    /// A handler is executing the job.
    Running,
    /// Job completed successfully.
    Completed,
    /// Job exhausted its retries.
    Failed,
    /// Job was cancelled before completion.
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Check if the job can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Only failed jobs may be retried by hand.
    pub fn can_retry(&self) -> bool {
        matches!(self, JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| RunnerError::Validation(format!("unknown job status: {s}")))
    }
}

/// A job represents a unit of work to be executed by the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Type of job (used for routing to handlers).
    pub job_type: JobType,
    /// Current status.
    pub status: JobStatus,
    /// Execution priority.
    pub priority: Priority,
    /// Opaque payload for the handler.
    #[serde(default)]
    pub payload: Payload,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the current attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last error message.
    pub error: Option<String>,
    /// Output of a successful handler.
    pub result: Option<Value>,
    /// Number of automatic retries consumed.
    #[serde(default)]
    pub retry_count: u32,
    /// Maximum number of automatic retries.
    pub max_retries: u32,
    /// Deadline for a single attempt, in seconds.
    pub timeout_seconds: u64,
    /// The job is not ready before this instant.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Opaque tag naming whoever created the job.
    pub created_by: Option<String>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(job_type: JobType, payload: Payload) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            status: JobStatus::Pending,
            priority: Priority::default(),
            payload,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            retry_count: 0,
            max_retries: 3,
            timeout_seconds: 300, // 5 minutes default
            scheduled_for: None,
            created_by: None,
        }
    }

    /// A pending job whose scheduled time, if any, has passed.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_for.is_none_or(|at| at <= now)
    }

    /// Duration between `started_at` and `completed_at`, when both are set.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

/// Parameters for a new job. Unset limits fall back to the runner's config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub job_type: JobType,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl EnqueueRequest {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            payload: Payload::new(),
            priority: Priority::default(),
            max_retries: None,
            timeout_seconds: None,
            scheduled_for: None,
            created_by: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn created_by(mut self, creator: impl Into<String>) -> Self {
        self.created_by = Some(creator.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for job_type in JobType::ALL {
            assert_eq!(job_type.as_str().parse::<JobType>().ok(), Some(job_type));
        }
        assert_eq!("critical".parse::<Priority>().ok(), Some(Priority::Critical));
        assert!(matches!(
            "urgent".parse::<Priority>(),
            Err(RunnerError::Validation(_))
        ));
        assert!(matches!(
            "reports".parse::<JobType>(),
            Err(RunnerError::Validation(_))
        ));
    }

    #[test]
    fn job_id_parses_its_display_form() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).ok(), Some(id));
        assert!(JobId::parse("not-a-ulid").is_err());
    }

    #[test]
    fn priority_orders_critical_first() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Critical];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::High, Priority::Low]
        );
        assert_eq!(Priority::Low.rank(), 3);
    }

    #[test]
    fn readiness_respects_schedule() {
        let now = Utc::now();
        let mut job = Job::new(JobType::Custom, Payload::new());
        assert!(job.is_ready(now));

        job.scheduled_for = Some(now + chrono::Duration::minutes(5));
        assert!(!job.is_ready(now));

        job.scheduled_for = Some(now - chrono::Duration::seconds(1));
        job.status = JobStatus::Running;
        assert!(!job.is_ready(now));
    }

    #[test]
    fn enqueue_request_rejects_unknown_type_on_deserialize() {
        let ok: Result<EnqueueRequest, _> =
            serde_json::from_str(r#"{"job_type":"bulk_import","priority":"high"}"#);
        assert!(ok.is_ok());

        let bad: Result<EnqueueRequest, _> = serde_json::from_str(r#"{"job_type":"email"}"#);
        assert!(bad.is_err());
    }
}

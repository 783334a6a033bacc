//! Aggregate statistics and worker status snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobType};

/// Counts and timings across the job and result stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerStats {
    /// Jobs currently held in the store.
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Jobs held per job type.
    pub by_type: BTreeMap<JobType, u64>,
    /// Results currently held in the store.
    pub results_stored: u64,
    /// Average duration over stored results that have one.
    pub avg_duration_ms: Option<f64>,
    /// Jobs the worker has taken to a terminal status.
    pub jobs_processed: u64,
    /// Percentage of finished jobs that completed; None until one finishes.
    pub success_rate: Option<f64>,
}

impl RunnerStats {
    /// Jobs still waiting or executing.
    pub fn active(&self) -> u64 {
        self.pending + self.running
    }

    /// Jobs that completed or failed.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Success rate as a percentage, from the current counts.
    pub fn compute_success_rate(&self) -> Option<f64> {
        let total = self.processed();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}

/// Snapshot of the worker loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub is_running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub jobs_processed: u64,
    pub current_job_id: Option<JobId>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_ignores_unfinished_jobs() {
        let mut stats = RunnerStats {
            pending: 4,
            running: 1,
            ..Default::default()
        };
        assert_eq!(stats.compute_success_rate(), None);
        assert_eq!(stats.active(), 5);

        stats.completed = 3;
        stats.failed = 1;
        assert_eq!(stats.compute_success_rate(), Some(75.0));
    }

    #[test]
    fn success_rate_is_serialized() {
        let stats = RunnerStats {
            completed: 1,
            success_rate: Some(100.0),
            ..Default::default()
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["success_rate"], serde_json::json!(100.0));
    }
}

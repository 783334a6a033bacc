//! Bounded, recency-ordered job and result stores.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use runner_core::{Job, JobId, JobResult, JobStatus, JobType, RunnerConfig};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A capacity-bounded map ordered by recency of insertion or access.
///
/// Each entry carries a monotonically increasing stamp; `order` maps stamps
/// back to keys so the least-recently-used entry is the first one in it.
#[derive(Debug)]
pub(crate) struct LruMap<K, V> {
    entries: HashMap<K, (u64, V)>,
    order: BTreeMap<u64, K>,
    tick: u64,
    capacity: usize,
}

impl<K: Copy + Eq + Hash, V> LruMap<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert at the most-recently-used end, replacing any previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.tick += 1;
        self.order.insert(self.tick, key);
        let previous = self.entries.insert(key, (self.tick, value));
        previous.map(|(stamp, value)| {
            self.order.remove(&stamp);
            value
        })
    }

    /// Look up and mark as most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.touch(key);
        self.entries.get(key).map(|(_, value)| value)
    }

    /// Mutable lookup; marks the entry as most recently used.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.touch(key);
        self.entries.get_mut(key).map(|(_, value)| value)
    }

    /// Look up without affecting recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(_, value)| value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (stamp, value) = self.entries.remove(key)?;
        self.order.remove(&stamp);
        Some(value)
    }

    /// Values from least to most recently used.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|(_, value)| value))
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.order.clear();
        removed
    }

    fn touch(&mut self, key: &K) -> bool {
        let Some((stamp, _)) = self.entries.get_mut(key) else {
            return false;
        };
        self.order.remove(&*stamp);
        self.tick += 1;
        *stamp = self.tick;
        self.order.insert(self.tick, *key);
        true
    }

    /// Evict entries until the map is back within capacity.
    ///
    /// The scan starts at the least-recently-used end. Entries rejected by
    /// `evictable` are moved to the most-recently-used end. A full pass
    /// without an evictable entry stops the scan, leaving the map over
    /// capacity.
    pub fn evict_overflow<F>(&mut self, mut evictable: F) -> Vec<(K, V)>
    where
        F: FnMut(&V) -> bool,
    {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let mut victim = None;
            for _ in 0..self.entries.len() {
                let Some((_, &key)) = self.order.first_key_value() else {
                    break;
                };
                if self
                    .entries
                    .get(&key)
                    .is_some_and(|(_, value)| evictable(value))
                {
                    victim = Some(key);
                    break;
                }
                self.touch(&key);
            }

            let Some(key) = victim else {
                break;
            };
            if let Some(value) = self.remove(&key) {
                evicted.push((key, value));
            }
        }
        evicted
    }
}

/// Filter options for listing jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.job_type.is_none_or(|t| job.job_type == t)
    }
}

/// One page of a job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    /// Number of jobs matching the filter before pagination.
    pub total: usize,
}

/// Both stores plus the cancellation tokens of in-flight attempts.
///
/// Always accessed under a single lock so a job transition and its result
/// are observed together.
pub(crate) struct Stores {
    pub jobs: LruMap<JobId, Job>,
    pub results: LruMap<JobId, JobResult>,
    pub tokens: HashMap<JobId, CancellationToken>,
}

impl Stores {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            jobs: LruMap::new(config.max_jobs),
            results: LruMap::new(config.max_results),
            tokens: HashMap::new(),
        }
    }

    /// Insert a job and evict terminal jobs beyond capacity.
    pub fn insert_job(&mut self, job: Job) -> Vec<JobId> {
        self.jobs.insert(job.id, job);
        self.enforce_job_capacity()
    }

    /// Only terminal jobs are ever evicted.
    pub fn enforce_job_capacity(&mut self) -> Vec<JobId> {
        let evicted: Vec<JobId> = self
            .jobs
            .evict_overflow(|job| job.status.is_terminal())
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for id in &evicted {
            self.tokens.remove(id);
            tracing::debug!("Evicted job {}", id);
        }
        evicted
    }

    /// Store a result, replacing the previous one for the same job.
    pub fn put_result(&mut self, result: JobResult) {
        self.results.insert(result.job_id, result);
        for (id, _) in self.results.evict_overflow(|_| true) {
            tracing::debug!("Evicted result for job {}", id);
        }
    }

    /// Highest-priority ready job, oldest first within a tier.
    pub fn next_ready(&self, now: DateTime<Utc>) -> Option<JobId> {
        self.jobs
            .values()
            .filter(|job| job.is_ready(now))
            .min_by_key(|job| (job.priority.rank(), job.created_at, job.id))
            .map(|job| job.id)
    }

    /// Filter, sort by priority then age, and paginate.
    pub fn list(&self, filter: &JobFilter) -> JobPage {
        let mut jobs: Vec<&Job> = self.jobs.values().filter(|j| filter.matches(j)).collect();
        jobs.sort_by_key(|job| (job.priority.rank(), job.created_at, job.id));

        let total = jobs.len();
        let jobs = jobs
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        JobPage { jobs, total }
    }
}

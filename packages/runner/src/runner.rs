//! The job runner service and its public API.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use ractor::{Actor, ActorRef};
use runner_core::{
    EnqueueRequest, Job, JobEvent, JobId, JobResult, JobStatus, RunnerConfig, RunnerError,
    RunnerStats, WorkerStatus,
};
use tokio::sync::broadcast;

use crate::handler::{JobHandler, JobHandlerRegistry};
use crate::store::{JobFilter, JobPage, Stores};
use crate::worker_actor::{WorkerActor, WorkerMessage};

/// A running worker actor and the task driving it.
struct WorkerHandle {
    actor: ActorRef<WorkerMessage>,
    join: tokio::task::JoinHandle<()>,
}

/// State shared between the public API, the engine and the worker.
pub(crate) struct Shared {
    pub config: RunnerConfig,
    pub stores: Mutex<Stores>,
    pub handlers: RwLock<JobHandlerRegistry>,
    pub worker: Mutex<WorkerStatus>,
    events: broadcast::Sender<JobEvent>,
}

impl Shared {
    /// Broadcast an event; having no subscribers is fine.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.events.send(event);
    }

    fn emit_evictions(&self, evicted: Vec<JobId>) {
        let timestamp = Utc::now();
        for job_id in evicted {
            self.emit(JobEvent::JobEvicted { job_id, timestamp });
        }
    }
}

/// In-process, priority-ordered background job runner.
///
/// Cheap to clone; all clones share the same stores and worker.
///
/// # Usage
///
/// ```ignore
/// let runner = JobRunner::new(RunnerConfig::default(), JobHandlerRegistry::with_defaults(collaborators));
/// runner.start_worker().await?;
/// let job = runner.enqueue(EnqueueRequest::new(JobType::Report))?;
/// ```
#[derive(Clone)]
pub struct JobRunner {
    shared: Arc<Shared>,
    worker: Arc<tokio::sync::Mutex<Option<WorkerHandle>>>,
}

impl JobRunner {
    pub fn new(config: RunnerConfig, handlers: JobHandlerRegistry) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Shared {
            stores: Mutex::new(Stores::new(&config)),
            handlers: RwLock::new(handlers),
            worker: Mutex::new(WorkerStatus::default()),
            events,
            config,
        };
        Self {
            shared: Arc::new(shared),
            worker: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.shared.config
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    /// Bind a handler to a job type that has none.
    pub fn register_handler<H: JobHandler>(&self, handler: H) -> Result<(), RunnerError> {
        self.shared.handlers.write().register(handler)
    }

    /// Bind a handler, displacing any existing one.
    pub fn replace_handler<H: JobHandler>(&self, handler: H) {
        self.shared.handlers.write().replace(handler);
    }

    /// Queue a new job.
    pub fn enqueue(&self, request: EnqueueRequest) -> Result<Job, RunnerError> {
        let config = &self.shared.config;
        let timeout_seconds = request
            .timeout_seconds
            .unwrap_or(config.default_timeout_secs);
        if timeout_seconds == 0 {
            return Err(RunnerError::Validation(
                "timeout_seconds must be positive".into(),
            ));
        }

        let mut job = Job::new(request.job_type, request.payload);
        job.priority = request.priority;
        job.max_retries = request.max_retries.unwrap_or(config.default_max_retries);
        job.timeout_seconds = timeout_seconds;
        job.scheduled_for = request.scheduled_for;
        job.created_by = request.created_by;

        let evicted = self.shared.stores.lock().insert_job(job.clone());

        tracing::debug!("Enqueued job {} ({}, {})", job.id, job.job_type, job.priority);
        self.shared.emit(JobEvent::JobEnqueued {
            job: job.clone(),
            timestamp: job.created_at,
        });
        self.shared.emit_evictions(evicted);
        Ok(job)
    }

    /// Get a job by ID.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.shared.stores.lock().jobs.get(&id).cloned()
    }

    /// List jobs matching the filter, most urgent and oldest first.
    pub fn list(&self, filter: &JobFilter) -> JobPage {
        self.shared.stores.lock().list(filter)
    }

    /// Result of the latest attempt of a job.
    pub fn get_result(&self, id: JobId) -> Option<JobResult> {
        self.shared.stores.lock().results.get(&id).cloned()
    }

    /// Cancel a pending or running job.
    ///
    /// Returns `false` when the job is unknown or already terminal. A running
    /// handler is signalled through its cancellation token.
    pub fn cancel(&self, id: JobId) -> bool {
        let now = Utc::now();
        let mut stores = self.shared.stores.lock();
        // Refused requests leave recency untouched.
        match stores.jobs.peek(&id) {
            Some(job) if job.status.can_cancel() => {}
            Some(job) => {
                tracing::debug!("Cannot cancel job {} in status {}", id, job.status);
                return false;
            }
            None => return false,
        }
        let Some(job) = stores.jobs.get_mut(&id) else {
            return false;
        };

        let previous_status = job.status;
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        job.error = Some("Job cancelled by user".into());
        let started_at = job.started_at;
        let record = JobResult::from_job(job, started_at, now);

        stores.put_result(record);
        if let Some(token) = stores.tokens.get(&id) {
            token.cancel();
        }
        drop(stores);

        tracing::info!("Job {} cancelled", id);
        self.shared.emit(JobEvent::JobCancelled {
            job_id: id,
            previous_status,
            timestamp: now,
        });
        true
    }

    /// Put a failed job back in the queue with a fresh retry budget.
    pub fn retry(&self, id: JobId) -> bool {
        let mut stores = self.shared.stores.lock();
        if !stores.jobs.peek(&id).is_some_and(|job| job.status.can_retry()) {
            return false;
        }
        let Some(job) = stores.jobs.get_mut(&id) else {
            return false;
        };

        job.status = JobStatus::Pending;
        job.started_at = None;
        job.completed_at = None;
        job.error = None;
        job.retry_count = 0;
        drop(stores);

        tracing::info!("Job {} requeued by hand", id);
        self.shared.emit(JobEvent::JobRetried {
            job_id: id,
            timestamp: Utc::now(),
        });
        true
    }

    /// Run one attempt of a job right now, outside the worker loop.
    pub async fn execute(&self, id: JobId) -> Result<JobResult, RunnerError> {
        self.shared.execute(id).await
    }

    /// Drop terminal jobs, and their results, that finished over `max_age` ago.
    pub fn clear_completed(&self, max_age: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let mut stores = self.shared.stores.lock();
        let stale: Vec<JobId> = stores
            .jobs
            .values()
            .filter(|job| {
                job.status.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff)
            })
            .map(|job| job.id)
            .collect();
        for id in &stale {
            stores.jobs.remove(id);
            stores.results.remove(id);
        }
        drop(stores);

        if !stale.is_empty() {
            tracing::info!("Cleared {} finished jobs", stale.len());
        }
        stale.len()
    }

    /// Empty both stores. Returns the number of jobs removed.
    pub fn clear_all(&self) -> usize {
        let mut stores = self.shared.stores.lock();
        for token in stores.tokens.values() {
            token.cancel();
        }
        stores.tokens.clear();
        stores.results.clear();
        let removed = stores.jobs.clear();
        drop(stores);

        tracing::info!("Cleared all {} jobs", removed);
        removed
    }

    /// Aggregate counts and timings.
    pub fn stats(&self) -> RunnerStats {
        let mut stats = RunnerStats::default();
        let stores = self.shared.stores.lock();
        for job in stores.jobs.values() {
            stats.total += 1;
            *stats.by_type.entry(job.job_type).or_default() += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }

        let durations: Vec<u64> = stores
            .results
            .values()
            .filter_map(|r| r.duration_ms)
            .collect();
        stats.results_stored = stores.results.len() as u64;
        drop(stores);

        if !durations.is_empty() {
            let sum: u64 = durations.iter().sum();
            stats.avg_duration_ms = Some(sum as f64 / durations.len() as f64);
        }
        stats.jobs_processed = self.shared.worker.lock().jobs_processed;
        stats.success_rate = stats.compute_success_rate();
        stats
    }

    pub fn worker_status(&self) -> WorkerStatus {
        self.shared.worker.lock().clone()
    }

    /// Start the worker loop. Does nothing if it is already running; a
    /// worker that exited on its own is replaced.
    pub async fn start_worker(&self) -> Result<(), RunnerError> {
        let mut slot = self.worker.lock().await;
        match slot.as_ref().map(|handle| handle.join.is_finished()) {
            Some(false) => return Ok(()),
            Some(true) => {
                // The actor died without going through stop_worker.
                tracing::warn!("Job worker exited unexpectedly, restarting");
                *slot = None;
                let mut status = self.shared.worker.lock();
                status.is_running = false;
                status.current_job_id = None;
            }
            None => {}
        }

        let (actor, join) = Actor::spawn(None, WorkerActor, self.shared.clone())
            .await
            .map_err(|e| RunnerError::Worker(format!("Failed to spawn worker: {}", e)))?;
        *slot = Some(WorkerHandle { actor, join });
        Ok(())
    }

    /// Stop the worker loop and wait for it to finish.
    ///
    /// The job in flight, if any, runs to completion first; it is not
    /// cancelled.
    pub async fn stop_worker(&self) -> Result<(), RunnerError> {
        let Some(handle) = self.worker.lock().await.take() else {
            return Ok(());
        };

        self.shared.worker.lock().is_running = false;
        handle.actor.stop(Some("stop requested".into()));
        handle
            .join
            .await
            .map_err(|e| RunnerError::Worker(format!("Worker task failed: {}", e)))
    }

    /// Wait until a job reaches a terminal status.
    ///
    /// Returns the job once terminal, or `None` if it is unknown or the
    /// timeout elapses first.
    pub async fn wait_for(&self, id: JobId, timeout: Duration) -> Option<Job> {
        let poll = async {
            loop {
                let job = self.get(id)?;
                if job.status.is_terminal() {
                    return Some(job);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{FnHandler, HandlerFuture};
    use runner_core::JobType;

    #[tokio::test]
    async fn start_worker_replaces_a_dead_worker() -> Result<(), Box<dyn std::error::Error>> {
        let mut registry = JobHandlerRegistry::new();
        registry.replace(FnHandler::new(JobType::Custom, |_job: &Job, _cancel| -> HandlerFuture {
            Box::pin(async { Ok(serde_json::Value::Null) })
        }));
        let runner = JobRunner::new(RunnerConfig::default().with_poll_interval_ms(5), registry);
        runner.start_worker().await?;

        // Worker exits without going through stop_worker.
        if let Some(handle) = runner.worker.lock().await.as_ref() {
            handle.actor.kill();
        }
        for _ in 0..100 {
            let finished = runner
                .worker
                .lock()
                .await
                .as_ref()
                .is_some_and(|handle| handle.join.is_finished());
            if finished {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        runner.start_worker().await?;
        let job = runner.enqueue(EnqueueRequest::new(JobType::Custom))?;
        let job = runner
            .wait_for(job.id, Duration::from_secs(5))
            .await
            .ok_or("restarted worker never ran the job")?;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(runner.worker_status().is_running);

        runner.stop_worker().await?;
        Ok(())
    }
}

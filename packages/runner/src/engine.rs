//! Execution engine: drives one job through a single attempt.
//!
//! Store mutations happen under the store lock; the handler itself runs
//! with the lock released so slow jobs never block the public API.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use runner_core::{
    HandlerError, HandlerErrorKind, Job, JobEvent, JobId, JobResult, JobStatus, RunnerError,
};
use tokio_util::sync::CancellationToken;

use crate::handler::{HandlerResult, JobHandler};
use crate::runner::Shared;

/// Everything the engine needs once the job has been claimed.
struct Attempt {
    job: Job,
    handler: Option<Arc<dyn JobHandler>>,
    token: CancellationToken,
    started_at: DateTime<Utc>,
}

impl Shared {
    /// Run a single attempt of `job_id` and record its outcome.
    ///
    /// Handler failures, timeouts and cancellation are folded into the job
    /// and the returned [`JobResult`]; only a missing job or one that is
    /// already terminal produce an error.
    pub(crate) async fn execute(&self, job_id: JobId) -> Result<JobResult, RunnerError> {
        let attempt = self.claim(job_id)?;
        tracing::info!(
            "Job {} ({}) started, attempt {}",
            job_id,
            attempt.job.job_type,
            attempt.job.retry_count + 1
        );
        self.emit(JobEvent::JobStarted {
            job_id,
            attempt: attempt.job.retry_count + 1,
            timestamp: attempt.started_at,
        });

        let outcome = match &attempt.handler {
            Some(handler) => run_handler(handler.as_ref(), &attempt.job, &attempt.token).await,
            None => Err(HandlerError::no_handler(attempt.job.job_type)),
        };

        self.settle(job_id, attempt.started_at, outcome)
    }

    /// Mark the job running and look up its handler.
    fn claim(&self, job_id: JobId) -> Result<Attempt, RunnerError> {
        let mut stores = self.stores.lock();
        let job = stores
            .jobs
            .get_mut(&job_id)
            .ok_or(RunnerError::NotFound(job_id))?;
        if job.status.is_terminal() {
            return Err(RunnerError::InvalidState {
                id: job_id,
                status: job.status,
            });
        }

        let started_at = Utc::now();
        job.status = JobStatus::Running;
        job.started_at = Some(started_at);
        let job = job.clone();

        let token = CancellationToken::new();
        stores.tokens.insert(job_id, token.clone());
        let handler = self.handlers.read().get(job.job_type);

        Ok(Attempt {
            job,
            handler,
            token,
            started_at,
        })
    }

    /// Apply the outcome of an attempt: finish, requeue or fail the job.
    fn settle(
        &self,
        job_id: JobId,
        started_at: DateTime<Utc>,
        outcome: HandlerResult,
    ) -> Result<JobResult, RunnerError> {
        let now = Utc::now();
        let mut stores = self.stores.lock();
        stores.tokens.remove(&job_id);

        let Some(job) = stores.jobs.get_mut(&job_id) else {
            tracing::warn!("Job {} disappeared while its handler ran", job_id);
            return Err(RunnerError::NotFound(job_id));
        };

        // A cancel issued while the handler ran wins over whatever it returned.
        let cancelled_by_user = job.status == JobStatus::Cancelled;
        let outcome = if cancelled_by_user {
            Err(HandlerError::cancelled())
        } else {
            outcome
        };

        let error_kind = outcome.as_ref().err().map(|e| e.kind);
        let event = match outcome {
            Ok(value) => {
                job.status = JobStatus::Completed;
                job.result = Some(value);
                job.error = None;
                job.completed_at = Some(now);
                let duration_ms = job.duration_ms();
                tracing::info!("Job {} completed in {:?}ms", job_id, duration_ms);
                Some(JobEvent::JobCompleted {
                    job_id,
                    duration_ms,
                    timestamp: now,
                })
            }
            Err(err) if err.kind == HandlerErrorKind::Cancelled => {
                let previous_status = job.status;
                job.status = JobStatus::Cancelled;
                job.error = Some(err.message);
                job.completed_at = Some(now);
                tracing::info!("Job {} cancelled during execution", job_id);
                // cancel() already announced it
                (!cancelled_by_user).then_some(JobEvent::JobCancelled {
                    job_id,
                    previous_status,
                    timestamp: now,
                })
            }
            Err(err) => {
                let will_retry = job.retry_count < job.max_retries;
                if will_retry {
                    job.retry_count += 1;
                    job.status = JobStatus::Pending;
                    job.started_at = None;
                    tracing::warn!(
                        "Job {} failed ({}), retry {}/{}: {}",
                        job_id,
                        err.kind.as_str(),
                        job.retry_count,
                        job.max_retries,
                        err.message
                    );
                } else {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(now);
                    tracing::error!(
                        "Job {} failed after {} retries ({}): {}",
                        job_id,
                        job.retry_count,
                        err.kind.as_str(),
                        err.message
                    );
                }
                job.error = Some(err.message.clone());
                Some(JobEvent::JobFailed {
                    job_id,
                    error: err.message,
                    retry_count: job.retry_count,
                    will_retry,
                    timestamp: now,
                })
            }
        };

        if job.status.is_terminal() {
            self.worker.lock().jobs_processed += 1;
        }

        let mut record = JobResult::from_job(job, Some(started_at), now);
        if let Some(kind) = error_kind {
            record = record.with_metadata("error_kind", kind.as_str());
        }
        stores.put_result(record.clone());
        drop(stores);

        if let Some(event) = event {
            self.emit(event);
        }
        Ok(record)
    }
}

/// Race the handler against its deadline and the job's cancellation.
///
/// The handler runs in its own task so a panic surfaces as an ordinary
/// failure instead of unwinding through the worker.
async fn run_handler(
    handler: &dyn JobHandler,
    job: &Job,
    token: &CancellationToken,
) -> HandlerResult {
    let future = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(job, token.clone())))
    {
        Ok(future) => future,
        Err(payload) => return Err(panicked(payload)),
    };
    let mut task = tokio::spawn(future);

    let deadline = Duration::from_secs(job.timeout_seconds);
    let outcome = tokio::select! {
        biased;
        () = token.cancelled() => Err(HandlerError::cancelled()),
        joined = tokio::time::timeout(deadline, &mut task) => match joined {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => Err(panicked(e.into_panic())),
            Ok(Err(e)) => Err(HandlerError::failed(format!("Handler task failed: {e}"))),
            Err(_) => Err(HandlerError::timed_out(job.timeout_seconds)),
        },
    };
    // No-op once the task has finished.
    task.abort();
    outcome
}

fn panicked(payload: Box<dyn Any + Send>) -> HandlerError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into());
    HandlerError::failed(format!("Handler panicked: {message}"))
}

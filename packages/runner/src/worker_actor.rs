//! Worker actor running the scheduling loop.
//!
//! Each `Tick` runs one iteration: pick the most urgent ready job, execute
//! it, record a heartbeat, sleep the poll interval and schedule the next
//! tick. Only one job is ever in flight.

use std::sync::Arc;

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use runner_core::{JobEvent, JobId};

use crate::runner::Shared;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    /// Run one loop iteration.
    Tick,
}

/// Worker actor that executes jobs one at a time.
pub(crate) struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = Arc<Shared>;
    type Arguments = Arc<Shared>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        shared: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let now = Utc::now();
        {
            let mut status = shared.worker.lock();
            status.is_running = true;
            status.started_at = Some(now);
            status.last_heartbeat = Some(now);
        }
        tracing::info!(
            "Starting job worker (poll interval {}ms)",
            shared.config.poll_interval_ms
        );
        shared.emit(JobEvent::WorkerStarted { timestamp: now });

        myself.send_message(WorkerMessage::Tick)?;
        Ok(shared)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        shared: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Tick => {
                run_iteration(shared).await;
                tokio::time::sleep(shared.config.poll_interval()).await;
                myself.send_message(WorkerMessage::Tick)?;
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        shared: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let jobs_processed = {
            let mut status = shared.worker.lock();
            status.is_running = false;
            status.current_job_id = None;
            status.jobs_processed
        };
        tracing::info!("Job worker stopped after {} jobs", jobs_processed);
        shared.emit(JobEvent::WorkerStopped {
            jobs_processed,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

/// Execute the most urgent ready job, if any, and record a heartbeat.
async fn run_iteration(shared: &Shared) -> Option<JobId> {
    let next = shared.stores.lock().next_ready(Utc::now());

    if let Some(job_id) = next {
        shared.worker.lock().current_job_id = Some(job_id);
        if let Err(e) = shared.execute(job_id).await {
            // The job changed under us, e.g. cancelled or cleared.
            tracing::debug!("Skipped job {}: {}", job_id, e);
        }
        shared.worker.lock().current_job_id = None;
    }

    shared.worker.lock().last_heartbeat = Some(Utc::now());
    next
}

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use job_runner::{JobHandlerRegistry, JobRunner};
use parking_lot::Mutex;
use runner_core::{EnqueueRequest, JobEvent, JobStatus, JobType, Priority, RunnerConfig};

use common::{echo, named, panics_first, recorder, runner, sleeper};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn worker_runs_jobs_in_priority_order() -> Result<(), Box<dyn Error>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let runner = runner(recorder(JobType::Custom, seen.clone()));

    // Enqueued before the worker starts so all are visible to the first pick.
    let mut last = None;
    for (name, priority) in [
        ("low", Priority::Low),
        ("normal", Priority::Normal),
        ("critical", Priority::Critical),
        ("high", Priority::High),
    ] {
        let job = runner.enqueue(
            EnqueueRequest::new(JobType::Custom)
                .with_priority(priority)
                .with_payload(named(name)),
        )?;
        if priority == Priority::Low {
            last = Some(job.id);
        }
    }

    runner.start_worker().await?;
    let last = last.ok_or("no low priority job")?;
    let done = runner.wait_for(last, WAIT).await.ok_or("worker stalled")?;
    runner.stop_worker().await?;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(*seen.lock(), vec!["critical", "high", "normal", "low"]);
    assert_eq!(runner.worker_status().jobs_processed, 4);
    Ok(())
}

#[tokio::test]
async fn scheduled_jobs_wait_until_due() -> Result<(), Box<dyn Error>> {
    let runner = runner(echo(JobType::Custom));
    let later = runner.enqueue(
        EnqueueRequest::new(JobType::Custom)
            .with_priority(Priority::Critical)
            .scheduled_for(Utc::now() + chrono::Duration::hours(1)),
    )?;
    let soon = runner.enqueue(
        EnqueueRequest::new(JobType::Custom)
            .scheduled_for(Utc::now() + chrono::Duration::milliseconds(50)),
    )?;

    runner.start_worker().await?;
    let soon = runner.wait_for(soon.id, WAIT).await.ok_or("due job never ran")?;
    runner.stop_worker().await?;

    assert_eq!(soon.status, JobStatus::Completed);
    assert_eq!(
        runner.get(later.id).map(|j| j.status),
        Some(JobStatus::Pending)
    );
    Ok(())
}

#[tokio::test]
async fn start_is_idempotent_and_stop_reports_status() -> Result<(), Box<dyn Error>> {
    let runner = runner(echo(JobType::Custom));
    let mut events = runner.subscribe();

    assert!(!runner.worker_status().is_running);
    runner.start_worker().await?;
    runner.start_worker().await?;

    tokio::time::sleep(Duration::from_millis(30)).await;
    let status = runner.worker_status();
    assert!(status.is_running);
    assert!(status.started_at.is_some());
    let first_beat = status.last_heartbeat.ok_or("no heartbeat")?;

    tokio::time::sleep(Duration::from_millis(30)).await;
    let later_beat = runner
        .worker_status()
        .last_heartbeat
        .ok_or("no heartbeat")?;
    assert!(later_beat > first_beat);

    runner.stop_worker().await?;
    runner.stop_worker().await?;
    let status = runner.worker_status();
    assert!(!status.is_running);
    assert_eq!(status.current_job_id, None);

    let mut started = 0;
    let mut stopped = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            JobEvent::WorkerStarted { .. } => started += 1,
            JobEvent::WorkerStopped { .. } => stopped += 1,
            _ => {}
        }
    }
    assert_eq!((started, stopped), (1, 1));
    Ok(())
}

#[tokio::test]
async fn api_stays_responsive_while_a_job_runs() -> Result<(), Box<dyn Error>> {
    let runner = runner(sleeper(JobType::Custom, Duration::from_millis(300)));
    let slow = runner.enqueue(EnqueueRequest::new(JobType::Custom))?;
    runner.start_worker().await?;

    let mut current = None;
    for _ in 0..100 {
        current = runner.worker_status().current_job_id;
        if current.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(current, Some(slow.id));

    // Store operations do not wait for the handler.
    let queued = tokio::time::timeout(Duration::from_millis(50), async {
        runner.enqueue(EnqueueRequest::new(JobType::Custom).with_priority(Priority::Critical))
    })
    .await??;
    assert_eq!(runner.get(slow.id).map(|j| j.status), Some(JobStatus::Running));
    assert_eq!(runner.get(queued.id).map(|j| j.status), Some(JobStatus::Pending));

    runner.wait_for(queued.id, WAIT).await.ok_or("second job never ran")?;
    runner.stop_worker().await?;
    assert_eq!(runner.stats().completed, 2);
    Ok(())
}

#[tokio::test]
async fn stop_lets_the_job_in_flight_finish() -> Result<(), Box<dyn Error>> {
    let runner = runner(sleeper(JobType::Custom, Duration::from_millis(100)));
    let job = runner.enqueue(EnqueueRequest::new(JobType::Custom))?;
    runner.start_worker().await?;

    for _ in 0..100 {
        if runner.get(job.id).is_some_and(|j| j.status == JobStatus::Running) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    runner.stop_worker().await?;

    assert_eq!(runner.get(job.id).map(|j| j.status), Some(JobStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn init_from_env_starts_the_worker() -> Result<(), Box<dyn Error>> {
    let runner = job_runner::init_job_runner(job_runner::Collaborators::new()).await?;
    assert!(runner.worker_status().is_running);

    let job = runner.enqueue(EnqueueRequest::new(JobType::Report).with_max_retries(0))?;
    let job = runner.wait_for(job.id, WAIT).await.ok_or("report never ran")?;
    runner.stop_worker().await?;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("report service is not configured"));
    Ok(())
}

#[tokio::test]
async fn custom_handler_registered_after_start() -> Result<(), Box<dyn Error>> {
    let runner = JobRunner::new(
        RunnerConfig::default().with_poll_interval_ms(5),
        JobHandlerRegistry::new(),
    );
    runner.start_worker().await?;
    runner.register_handler(echo(JobType::Custom))?;

    let job = runner.enqueue(EnqueueRequest::new(JobType::Custom))?;
    let job = runner.wait_for(job.id, WAIT).await.ok_or("job never ran")?;
    runner.stop_worker().await?;

    assert_eq!(job.status, JobStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn worker_survives_a_panicking_handler() -> Result<(), Box<dyn Error>> {
    let mut registry = JobHandlerRegistry::new();
    registry.replace(panics_first(JobType::Custom));
    registry.replace(echo(JobType::Export));
    let runner = JobRunner::new(RunnerConfig::default().with_poll_interval_ms(5), registry);

    let flaky = runner.enqueue(EnqueueRequest::new(JobType::Custom).with_max_retries(3))?;
    runner.start_worker().await?;
    let healthy = runner.enqueue(EnqueueRequest::new(JobType::Export))?;

    let flaky = runner.wait_for(flaky.id, WAIT).await.ok_or("flaky job stuck")?;
    let healthy = runner.wait_for(healthy.id, WAIT).await.ok_or("worker died")?;

    assert_eq!(flaky.status, JobStatus::Completed);
    assert_eq!(flaky.retry_count, 1);
    assert_eq!(healthy.status, JobStatus::Completed);
    assert!(runner.get_result(flaky.id).is_some());

    let status = runner.worker_status();
    assert!(status.is_running);
    assert_eq!(status.jobs_processed, 2);
    runner.stop_worker().await?;
    Ok(())
}

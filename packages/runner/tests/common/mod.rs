#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use job_runner::{FnHandler, HandlerFuture, JobHandler, JobHandlerRegistry, JobRunner};
use runner_core::{Job, JobType, RunnerConfig};
use serde_json::{Value, json};

/// Runner with a fast poll interval and a single handler.
pub fn runner(handler: impl JobHandler) -> JobRunner {
    let mut registry = JobHandlerRegistry::new();
    registry.replace(handler);
    JobRunner::new(RunnerConfig::default().with_poll_interval_ms(5), registry)
}

/// Succeeds with the job's payload echoed back.
pub fn echo(job_type: JobType) -> impl JobHandler {
    FnHandler::new(job_type, |job: &Job, _cancel| -> HandlerFuture {
        let payload = Value::Object(job.payload.clone());
        Box::pin(async move { Ok(json!({ "echo": payload })) })
    })
}

/// Fails on every call, counting the attempts.
pub fn always_fail(job_type: JobType, calls: Arc<AtomicU32>) -> impl JobHandler {
    FnHandler::new(job_type, move |_job: &Job, _cancel| -> HandlerFuture {
        let calls = calls.clone();
        Box::pin(async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("boom #{n}").into())
        })
    })
}

/// Sleeps for `duration`, ignoring cancellation.
pub fn sleeper(job_type: JobType, duration: Duration) -> impl JobHandler {
    FnHandler::new(job_type, move |_job: &Job, _cancel| -> HandlerFuture {
        Box::pin(async move {
            tokio::time::sleep(duration).await;
            Ok(json!("rested"))
        })
    })
}

/// Waits until the job is cancelled.
pub fn until_cancelled(job_type: JobType) -> impl JobHandler {
    FnHandler::new(job_type, |_job: &Job, cancel| -> HandlerFuture {
        Box::pin(async move {
            cancel.cancelled().await;
            Err("stopped early".into())
        })
    })
}

/// Panics on the first attempt, succeeds on every retry.
pub fn panics_first(job_type: JobType) -> impl JobHandler {
    FnHandler::new(job_type, |job: &Job, _cancel| -> HandlerFuture {
        let retry_count = job.retry_count;
        Box::pin(async move {
            if retry_count == 0 {
                panic!("first attempt always panics");
            }
            Ok(json!({ "attempt": retry_count + 1 }))
        })
    })
}

/// Records the order in which jobs are handled.
pub fn recorder(job_type: JobType, seen: Arc<parking_lot::Mutex<Vec<String>>>) -> impl JobHandler {
    FnHandler::new(job_type, move |job: &Job, _cancel| -> HandlerFuture {
        let seen = seen.clone();
        let name = job
            .payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Box::pin(async move {
            seen.lock().push(name);
            Ok(Value::Null)
        })
    })
}

pub fn named(name: &str) -> runner_core::Payload {
    let mut payload = runner_core::Payload::new();
    payload.insert("name".into(), json!(name));
    payload
}

//! Demo driver for the job runner.
//!
//! Starts a runner with in-memory collaborators, enqueues one job of each
//! kind, logs lifecycle events as they arrive, waits for the jobs and
//! prints the final stats as JSON.

use std::time::Duration;

use job_runner::{
    BulkExporter, BulkImporter, CollaboratorFuture, Collaborators, ExportOutput, FnHandler,
    HandlerFuture, ImportOutcome, ReportService, RowError, init_job_runner,
};
use runner_core::{EnqueueRequest, Job, JobType, Payload, Priority};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Renders a fixed-size placeholder report.
struct DemoReports;

impl ReportService for DemoReports {
    fn run_schedule(&self, schedule_id: String) -> CollaboratorFuture<Vec<u8>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(format!("report for schedule {schedule_id}").into_bytes())
        })
    }

    fn generate(&self, payload: Payload) -> CollaboratorFuture<Vec<u8>> {
        Box::pin(async move {
            serde_json::to_vec(&payload).map_err(|e| format!("cannot render report: {e}"))
        })
    }
}

/// Exports the rows listed in the payload as CSV.
struct DemoExporter;

impl BulkExporter for DemoExporter {
    fn export(&self, payload: Payload) -> CollaboratorFuture<ExportOutput> {
        Box::pin(async move {
            let rows = payload
                .get("rows")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let body: String = rows.iter().map(|row| format!("{row}\n")).collect();
            Ok(ExportOutput {
                format: "csv".into(),
                rows: rows.len() as u64,
                bytes: body.into_bytes(),
            })
        })
    }
}

/// Accepts every row that has a `sku`.
struct DemoImporter;

impl BulkImporter for DemoImporter {
    fn import(&self, payload: Payload) -> CollaboratorFuture<ImportOutcome> {
        Box::pin(async move {
            let mut outcome = ImportOutcome::default();
            let rows = payload.get("rows").and_then(Value::as_array);
            for (index, row) in rows.into_iter().flatten().enumerate() {
                if row.get("sku").is_some() {
                    outcome.created += 1;
                } else {
                    outcome.errors.push(RowError {
                        row: index as u64 + 1,
                        message: "missing sku".into(),
                    });
                }
            }
            Ok(outcome)
        })
    }
}

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let collaborators = Collaborators::new()
        .with_reports(DemoReports)
        .with_exporter(DemoExporter)
        .with_importer(DemoImporter);
    let runner = init_job_runner(collaborators).await?;

    let mut events = runner.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(at = %event.timestamp(), "{}", event.description()),
                Err(RecvError::Lagged(missed)) => tracing::warn!("Missed {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Demo: flaky custom handler that fails until its second retry.
    runner.register_handler(FnHandler::new(JobType::Custom, |job: &Job, _cancel| -> HandlerFuture {
        let retry_count = job.retry_count;
        Box::pin(async move {
            if retry_count < 2 {
                Err(format!("flaky failure on attempt {}", retry_count + 1).into())
            } else {
                Ok(json!({ "attempts": retry_count + 1 }))
            }
        })
    }))?;

    let requests = [
        EnqueueRequest::new(JobType::Report)
            .with_payload(payload(json!({ "schedule_id": "weekly-sales" })))
            .with_priority(Priority::High),
        EnqueueRequest::new(JobType::Export)
            .with_payload(payload(json!({ "rows": [[1, "a"], [2, "b"]] }))),
        EnqueueRequest::new(JobType::BulkImport)
            .with_payload(payload(json!({ "rows": [{ "sku": "A-1" }, { "name": "no sku" }] })))
            .with_priority(Priority::Critical),
        EnqueueRequest::new(JobType::Custom).with_priority(Priority::Low),
    ];

    let mut ids = Vec::new();
    for request in requests {
        let job = runner.enqueue(request.created_by("runner-demo"))?;
        tracing::info!("Enqueued {} job {}", job.job_type, job.id);
        ids.push(job.id);
    }

    for id in ids {
        match runner.wait_for(id, Duration::from_secs(10)).await {
            Some(job) => tracing::info!("Job {} finished as {}", job.id, job.status),
            None => tracing::warn!("Job {} did not finish in time", id),
        }
        if let Some(result) = runner.get_result(id) {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    runner.stop_worker().await?;
    println!("{}", serde_json::to_string_pretty(&runner.stats())?);
    Ok(())
}

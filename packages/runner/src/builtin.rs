//! Built-in handlers for reports, exports and bulk imports.
//!
//! The actual work is done by collaborators supplied by the host
//! application. A handler whose collaborator is missing fails with
//! [`HandlerErrorKind::NotConfigured`](runner_core::HandlerErrorKind), which
//! the engine treats like any other failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use runner_core::{HandlerError, Job, JobType, Payload};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::handler::{HandlerFuture, JobHandler, JobHandlerRegistry};

/// Future returned by collaborators.
pub type CollaboratorFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

/// Renders reports, either on demand or for a stored schedule.
pub trait ReportService: Send + Sync + 'static {
    /// Run the report bound to a schedule and return the rendered output.
    fn run_schedule(&self, schedule_id: String) -> CollaboratorFuture<Vec<u8>>;

    /// Render a report described by the payload.
    fn generate(&self, payload: Payload) -> CollaboratorFuture<Vec<u8>>;
}

/// Output of a bulk export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOutput {
    pub format: String,
    pub rows: u64,
    pub bytes: Vec<u8>,
}

/// Serializes entities into an export file.
pub trait BulkExporter: Send + Sync + 'static {
    fn export(&self, payload: Payload) -> CollaboratorFuture<ExportOutput>;
}

/// A row rejected during import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: u64,
    pub message: String,
}

/// Counts produced by a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    #[serde(default)]
    pub errors: Vec<RowError>,
}

/// Parses an uploaded file and applies its rows.
pub trait BulkImporter: Send + Sync + 'static {
    fn import(&self, payload: Payload) -> CollaboratorFuture<ImportOutcome>;
}

/// The collaborators available to the built-in handlers.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub reports: Option<Arc<dyn ReportService>>,
    pub exporter: Option<Arc<dyn BulkExporter>>,
    pub importer: Option<Arc<dyn BulkImporter>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reports(mut self, reports: impl ReportService) -> Self {
        self.reports = Some(Arc::new(reports));
        self
    }

    pub fn with_exporter(mut self, exporter: impl BulkExporter) -> Self {
        self.exporter = Some(Arc::new(exporter));
        self
    }

    pub fn with_importer(mut self, importer: impl BulkImporter) -> Self {
        self.importer = Some(Arc::new(importer));
        self
    }
}

impl JobHandlerRegistry {
    /// Registry with the report, export and bulk import handlers bound.
    pub fn with_defaults(collaborators: Collaborators) -> Self {
        let mut registry = Self::new();
        registry.replace(ReportHandler {
            reports: collaborators.reports,
        });
        registry.replace(ExportHandler {
            exporter: collaborators.exporter,
        });
        registry.replace(BulkImportHandler {
            importer: collaborators.importer,
        });
        registry
    }
}

/// Runs `schedule_id` through the report service when the payload names
/// one, otherwise renders the payload on demand.
pub struct ReportHandler {
    reports: Option<Arc<dyn ReportService>>,
}

impl JobHandler for ReportHandler {
    fn job_type(&self) -> JobType {
        JobType::Report
    }

    fn handle(&self, job: &Job, _cancel: CancellationToken) -> HandlerFuture {
        let reports = self.reports.clone();
        let payload = job.payload.clone();
        Box::pin(async move {
            let reports = reports.ok_or_else(|| HandlerError::not_configured("report service"))?;
            let schedule_id = payload
                .get("schedule_id")
                .and_then(Value::as_str)
                .map(str::to_owned);

            let output = match &schedule_id {
                Some(id) => reports.run_schedule(id.clone()).await,
                None => reports.generate(payload).await,
            }
            .map_err(HandlerError::failed)?;

            Ok(json!({
                "schedule_id": schedule_id,
                "output_size": output.len(),
                "generated_at": Utc::now(),
            }))
        })
    }
}

pub struct ExportHandler {
    exporter: Option<Arc<dyn BulkExporter>>,
}

impl JobHandler for ExportHandler {
    fn job_type(&self) -> JobType {
        JobType::Export
    }

    fn handle(&self, job: &Job, _cancel: CancellationToken) -> HandlerFuture {
        let exporter = self.exporter.clone();
        let payload = job.payload.clone();
        Box::pin(async move {
            let exporter = exporter.ok_or_else(|| HandlerError::not_configured("bulk exporter"))?;
            let output = exporter
                .export(payload)
                .await
                .map_err(HandlerError::failed)?;

            Ok(json!({
                "format": output.format,
                "rows": output.rows,
                "output_size": output.bytes.len(),
                "exported_at": Utc::now(),
            }))
        })
    }
}

pub struct BulkImportHandler {
    importer: Option<Arc<dyn BulkImporter>>,
}

impl JobHandler for BulkImportHandler {
    fn job_type(&self) -> JobType {
        JobType::BulkImport
    }

    fn handle(&self, job: &Job, _cancel: CancellationToken) -> HandlerFuture {
        let importer = self.importer.clone();
        let payload = job.payload.clone();
        Box::pin(async move {
            let importer = importer.ok_or_else(|| HandlerError::not_configured("bulk importer"))?;
            let outcome = importer
                .import(payload)
                .await
                .map_err(HandlerError::failed)?;

            serde_json::to_value(&outcome).map_err(|e| HandlerError::failed(e.to_string()))
        })
    }
}

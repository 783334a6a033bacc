//! Background job runner.
//!
//! An in-process, priority-ordered queue that executes jobs one at a time
//! with per-job timeouts, automatic retries, cooperative cancellation and
//! bounded, LRU-evicted history.
//!
//! # Architecture
//!
//! - `JobRunner` - Service object owning the stores; the public API
//! - `Stores` - Job and result maps behind a single lock
//! - `JobHandlerRegistry` - Handlers keyed by job type
//! - `WorkerActor` - Ractor actor running the scheduling loop
//!
//! # Usage
//!
//! ```ignore
//! use job_runner::{Collaborators, init_job_runner};
//! use runner_core::{EnqueueRequest, JobType, Priority};
//!
//! let runner = init_job_runner(Collaborators::new().with_reports(reports)).await?;
//! let job = runner.enqueue(EnqueueRequest::new(JobType::Report).with_priority(Priority::High))?;
//! let finished = runner.wait_for(job.id, Duration::from_secs(30)).await;
//! ```

mod builtin;
mod engine;
mod handler;
mod init;
mod runner;
mod store;
mod worker_actor;

pub use builtin::{
    BulkExporter, BulkImportHandler, BulkImporter, Collaborators, CollaboratorFuture,
    ExportHandler, ExportOutput, ImportOutcome, ReportHandler, ReportService, RowError,
};
pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobHandler, JobHandlerRegistry};
pub use init::init_job_runner;
pub use runner::JobRunner;
pub use store::{JobFilter, JobPage};

/// Re-export the cancellation token handed to handlers.
pub use tokio_util::sync::CancellationToken;

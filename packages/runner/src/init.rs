//! Bootstrap for the job runner.

use runner_core::{RunnerConfig, RunnerError};

use crate::builtin::Collaborators;
use crate::handler::JobHandlerRegistry;
use crate::runner::JobRunner;

/// Build a runner from the environment and start its worker.
///
/// Configuration comes from [`RunnerConfig::from_env`]; the built-in
/// handlers are bound to `collaborators`.
pub async fn init_job_runner(collaborators: Collaborators) -> Result<JobRunner, RunnerError> {
    tracing::info!("Initializing job runner...");

    let config = RunnerConfig::from_env();
    tracing::info!(
        "Job runner capacity: {} jobs, {} results",
        config.max_jobs,
        config.max_results
    );

    let handlers = JobHandlerRegistry::with_defaults(collaborators);
    let runner = JobRunner::new(config, handlers);
    runner.start_worker().await?;

    tracing::info!("Job runner initialized");
    Ok(runner)
}

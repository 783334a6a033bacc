//! Handlers bound to job types, and the registry the engine consults.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use runner_core::{HandlerError, Job, JobType, RunnerError};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Serializable output on success, a classified error on failure.
pub type HandlerResult = Result<Value, HandlerError>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Executes jobs of one [`JobType`].
///
/// The token fires when the job is cancelled; handlers should stop promptly
/// once it does, but nothing forces them to.
pub trait JobHandler: Send + Sync + 'static {
    fn job_type(&self) -> JobType;

    /// Process a job and return a serializable result.
    fn handle(&self, job: &Job, cancel: CancellationToken) -> HandlerFuture;
}

/// Registry for job handlers, one per job type.
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job type that has none yet.
    pub fn register<H: JobHandler>(&mut self, handler: H) -> Result<(), RunnerError> {
        let job_type = handler.job_type();
        if self.handlers.contains_key(&job_type) {
            return Err(RunnerError::HandlerAlreadyRegistered(job_type));
        }
        self.handlers.insert(job_type, Arc::new(handler));
        Ok(())
    }

    /// Bind a handler, returning the one it displaced.
    pub fn replace<H: JobHandler>(&mut self, handler: H) -> Option<Arc<dyn JobHandler>> {
        self.handlers.insert(handler.job_type(), Arc::new(handler))
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    pub fn has_handler(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// Bound job types, in declaration order.
    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}

/// Adapts a closure into a [`JobHandler`].
pub struct FnHandler<F>
where
    F: Fn(&Job, CancellationToken) -> HandlerFuture + Send + Sync + 'static,
{
    job_type: JobType,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job, CancellationToken) -> HandlerFuture + Send + Sync + 'static,
{
    pub fn new(job_type: JobType, handler: F) -> Self {
        Self { job_type, handler }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job, CancellationToken) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> JobType {
        self.job_type
    }

    fn handle(&self, job: &Job, cancel: CancellationToken) -> HandlerFuture {
        (self.handler)(job, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(job_type: JobType) -> impl JobHandler {
        FnHandler::new(job_type, |_job: &Job, _cancel| {
            Box::pin(async { Ok(Value::Null) })
        })
    }

    #[test]
    fn register_rejects_bound_type() {
        let mut registry = JobHandlerRegistry::new();
        assert!(registry.register(noop(JobType::Custom)).is_ok());
        assert_eq!(
            registry.register(noop(JobType::Custom)),
            Err(RunnerError::HandlerAlreadyRegistered(JobType::Custom))
        );
        assert!(registry.replace(noop(JobType::Custom)).is_some());
        assert_eq!(registry.job_types(), vec![JobType::Custom]);
        assert!(!registry.has_handler(JobType::Export));
    }
}

//! Work-function registry: dotted names resolved to async handlers.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::broker::QueuedJob;
use crate::progress::{JobContext, ProgressError};

/// Work-function failure. Any error marks the job failed at the broker; the
/// durable task record is deliberately left untouched (see the error design:
/// the bridge only runs on paths the work function itself drives).
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl WorkError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

type WorkFuture = Pin<Box<dyn Future<Output = Result<(), WorkError>> + Send>>;

/// A registered work function. Receives the execution context (its progress
/// capability) and the dequeued job (its arguments).
pub type WorkFn = Arc<dyn Fn(JobContext, QueuedJob) -> WorkFuture + Send + Sync>;

/// Maps dotted work-function names to handlers inside a worker process.
///
/// Resolution happens at execution time, never at enqueue time: a name that
/// resolves in the enqueuing process means nothing; only this registry, in
/// the worker's process, decides.
#[derive(Default)]
pub struct WorkRegistry {
    handlers: HashMap<String, WorkFn>,
}

impl WorkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a dotted name, replacing any previous one.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(JobContext, QueuedJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        self.handlers.insert(
            name.into(),
            Arc::new(move |ctx, job| Box::pin(handler(ctx, job))),
        );
    }

    /// Resolve a name to its handler.
    pub fn resolve(&self, name: &str) -> Option<WorkFn> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, for startup logging.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for WorkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkRegistry")
            .field("names", &self.names())
            .finish()
    }
}

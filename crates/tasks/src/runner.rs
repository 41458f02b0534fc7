//! Worker runtime: dequeue, dispatch, report.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerError, JobBroker, JobStatus, QueuedJob};
use crate::progress::JobContext;
use crate::registry::{WorkError, WorkRegistry};
use crate::store::TaskStore;

/// Worker runtime configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging.
    pub name: String,
    /// Queues to poll, highest priority first.
    pub queues: Vec<String>,
    /// How long a single dequeue waits before re-checking shutdown.
    pub poll_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            queues: vec!["default".to_string()],
            poll_timeout: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }
}

/// The worker runtime.
///
/// Owns explicit handles to the broker, the durable store, and the work
/// registry: a worker process constructs all three itself at startup, since
/// it shares nothing with the enqueuing process but the two external stores.
/// Runs one job at a time; parallelism comes from running more worker
/// processes against the same queues, and the broker guarantees each job is
/// delivered to at most one of them.
pub struct Worker {
    broker: Arc<dyn JobBroker>,
    store: Arc<dyn TaskStore>,
    registry: Arc<WorkRegistry>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        broker: Arc<dyn JobBroker>,
        store: Arc<dyn TaskStore>,
        registry: Arc<WorkRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            broker,
            store,
            registry,
            config,
        }
    }

    /// Run until the shutdown flag flips to `true`.
    ///
    /// Shutdown is graceful: an in-flight job runs to completion, only the
    /// polling stops. There is no cancellation primitive; once dequeued, a
    /// job runs to success or failure.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            worker = %self.config.name,
            queues = ?self.config.queues,
            functions = ?self.registry.names(),
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let dequeued = tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender means the process is tearing down.
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                result = self.broker.dequeue(&self.config.queues, self.config.poll_timeout) => result,
            };

            match dequeued {
                Ok(Some(job)) => self.execute(job).await,
                Ok(None) => continue,
                Err(e) => {
                    error!(worker = %self.config.name, error = %e, "dequeue failed");
                    tokio::time::sleep(self.config.poll_timeout).await;
                }
            }
        }

        info!(worker = %self.config.name, "worker stopped");
    }

    /// Dequeue and execute at most one job. Returns whether one ran.
    pub async fn run_one(&self) -> Result<bool, BrokerError> {
        match self
            .broker
            .dequeue(&self.config.queues, self.config.poll_timeout)
            .await?
        {
            Some(job) => {
                self.execute(job).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn execute(&self, job: QueuedJob) {
        let job_id = job.id.clone();
        debug!(worker = %self.config.name, job_id = %job_id, name = %job.name, "job dequeued");

        if let Err(e) = self.broker.mark_status(&job_id, JobStatus::Running).await {
            warn!(job_id = %job_id, error = %e, "failed to mark job running");
        }

        // Name resolution happens here, in this process. An unresolvable
        // name is an execution failure, invisible at enqueue time.
        let outcome = match self.registry.resolve(&job.name) {
            Some(work) => {
                let ctx = JobContext::new(job_id.clone(), self.broker.clone(), self.store.clone());
                work(ctx, job).await
            }
            None => Err(WorkError::failed(format!(
                "no work function registered for '{}'",
                job.name
            ))),
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = self.broker.mark_status(&job_id, JobStatus::Succeeded).await {
                    warn!(job_id = %job_id, error = %e, "failed to mark job succeeded");
                }
                debug!(job_id = %job_id, "job succeeded");
            }
            Err(e) => {
                if let Err(mark_err) = self.broker.mark_status(&job_id, JobStatus::Failed).await {
                    warn!(job_id = %job_id, error = %mark_err, "failed to mark job failed");
                }
                warn!(job_id = %job_id, error = %e, "job failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryJobBroker;
    use crate::launch::TaskLauncher;
    use crate::progress::task_progress;
    use crate::store::InMemoryTaskStore;
    use ripple_core::UserId;

    struct Fixture {
        broker: Arc<InMemoryJobBroker>,
        store: Arc<InMemoryTaskStore>,
        launcher: TaskLauncher,
    }

    fn fixture() -> Fixture {
        let broker = Arc::new(InMemoryJobBroker::new());
        let store = Arc::new(InMemoryTaskStore::new());
        let launcher = TaskLauncher::new(broker.clone(), "default");
        Fixture {
            broker,
            store,
            launcher,
        }
    }

    fn worker(fx: &Fixture, registry: WorkRegistry) -> Worker {
        Worker::new(
            fx.broker.clone(),
            fx.store.clone(),
            Arc::new(registry),
            WorkerConfig {
                poll_timeout: Duration::from_millis(50),
                ..WorkerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn count_to_ten_end_to_end() {
        let fx = fixture();
        let owner = UserId::new();

        let mut registry = WorkRegistry::new();
        registry.register("count_to_ten", |ctx, _job| async move {
            for p in [0u8, 50, 100] {
                ctx.set_progress(p).await?;
            }
            Ok(())
        });
        let worker = worker(&fx, registry);

        let mut tx = fx.store.begin().await.unwrap();
        let task = fx
            .launcher
            .launch(tx.as_mut(), owner, "count_to_ten", "counting", serde_json::Value::Null)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(worker.run_one().await.unwrap());

        // Completed: gone from the incomplete list, progress reads 100,
        // broker recorded success.
        assert!(fx.store.list_incomplete(owner).await.unwrap().is_empty());
        let stored = fx.store.get(&task.id).await.unwrap().unwrap();
        assert!(stored.complete);
        assert_eq!(task_progress(fx.broker.as_ref(), &stored).await, 100);
        let handle = fx.broker.fetch_job(&task.id).await.unwrap().unwrap();
        assert_eq!(handle.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn unresolvable_name_fails_at_execution_not_enqueue() {
        let fx = fixture();
        let owner = UserId::new();
        let worker = worker(&fx, WorkRegistry::new());

        // Enqueue accepts the name without question.
        let mut tx = fx.store.begin().await.unwrap();
        let task = fx
            .launcher
            .launch(tx.as_mut(), owner, "no.such.function", "", serde_json::Value::Null)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(worker.run_one().await.unwrap());

        let handle = fx.broker.fetch_job(&task.id).await.unwrap().unwrap();
        assert_eq!(handle.status, JobStatus::Failed);
        // Known gap, kept deliberately: a failed job leaves the durable record
        // incomplete forever.
        assert!(!fx.store.get(&task.id).await.unwrap().unwrap().complete);
    }

    #[tokio::test]
    async fn failing_work_function_marks_job_failed() {
        let fx = fixture();
        let owner = UserId::new();

        let mut registry = WorkRegistry::new();
        registry.register("demo.flaky", |ctx, _job| async move {
            ctx.set_progress(40).await?;
            Err(WorkError::failed("disk on fire"))
        });
        let worker = worker(&fx, registry);

        let mut tx = fx.store.begin().await.unwrap();
        let task = fx
            .launcher
            .launch(tx.as_mut(), owner, "demo.flaky", "", serde_json::Value::Null)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        worker.run_one().await.unwrap();

        let stored = fx.store.get(&task.id).await.unwrap().unwrap();
        assert!(!stored.complete);
        // Progress written before the failure is still visible.
        assert_eq!(task_progress(fx.broker.as_ref(), &stored).await, 40);
        let handle = fx.broker.fetch_job(&task.id).await.unwrap().unwrap();
        assert_eq!(handle.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn run_loop_drains_jobs_and_honors_shutdown() {
        let fx = fixture();
        let owner = UserId::new();

        let mut registry = WorkRegistry::new();
        registry.register("demo.finish", |ctx, _job| async move {
            ctx.set_progress(100).await?;
            Ok(())
        });
        let worker = Arc::new(worker(&fx, registry));

        let mut tx = fx.store.begin().await.unwrap();
        for _ in 0..3 {
            fx.launcher
                .launch(tx.as_mut(), owner, "demo.finish", "", serde_json::Value::Null)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(shutdown_rx).await })
        };

        // Wait for the loop to drain all three jobs, then stop it.
        for _ in 0..100 {
            if fx.store.list_incomplete(owner).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        run.await.unwrap();

        assert!(fx.store.list_incomplete(owner).await.unwrap().is_empty());
    }
}

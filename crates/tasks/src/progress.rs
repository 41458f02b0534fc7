//! Progress bridge: the write path from inside a running job back to both the
//! broker's ephemeral metadata and the durable task record.

use std::sync::Arc;

use ripple_core::JobId;

use crate::broker::{BrokerError, JobBroker, JobHandle};
use crate::store::{TaskStore, TaskStoreError};
use crate::task::Task;

/// Progress bridge failure.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

/// Execution context handed to every work-function invocation.
///
/// This is a capability, not an ambient lookup: only code that was given a
/// context by the worker runtime can report progress, and the job id it
/// reports against is fixed at construction. The broker write comes first and
/// is persisted immediately (cheap enough for a hot loop); the durable commit
/// follows, so completion survives broker restarts. A store error here leaves
/// the broker metadata ahead of the durable record (an accepted window of at
/// most one call's drift) and propagates into the worker's failure path.
pub struct JobContext {
    job_id: JobId,
    broker: Arc<dyn JobBroker>,
    store: Arc<dyn TaskStore>,
}

impl JobContext {
    pub fn new(job_id: JobId, broker: Arc<dyn JobBroker>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            job_id,
            broker,
            store,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Report fractional completion (clamped to 0–100).
    ///
    /// At 100 the durable record's `complete` flag is set (idempotently) and
    /// committed; below 100 the durable record is loaded and left untouched.
    pub async fn set_progress(&self, progress: u8) -> Result<(), ProgressError> {
        let progress = progress.min(100);
        self.broker.set_progress(&self.job_id, progress).await?;

        let mut tx = self.store.begin().await?;
        match tx.get(&self.job_id).await? {
            Some(task) => {
                if progress >= 100 && !task.complete {
                    tx.set_complete(&self.job_id).await?;
                }
            }
            None => {
                // A job can outlive its record (staging failed, or the row was
                // removed out-of-band). Progress still flows to the broker.
                tracing::warn!(job_id = %self.job_id, "no durable task record for running job");
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read path
// ─────────────────────────────────────────────────────────────────────────────

/// Live progress for a task.
///
/// When the broker no longer knows the job (expired, evicted, or the broker
/// restarted) this reports exactly 100: absence of live job state means
/// there is nothing left to wait for. That holds even when the durable record
/// still says `complete = false` (e.g. the job failed before reporting).
pub async fn task_progress(broker: &dyn JobBroker, task: &Task) -> u8 {
    match broker.progress_of(&task.id).await {
        Ok(Some(progress)) => progress.min(100),
        Ok(None) | Err(_) => 100,
    }
}

/// Live broker handle for a task. `None` (not an error) when the id is
/// unknown to the broker or the broker is unreachable; callers fall back to
/// the durable `complete` flag.
pub async fn broker_job(broker: &dyn JobBroker, task: &Task) -> Option<JobHandle> {
    match broker.fetch_job(&task.id).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!(job_id = %task.id, error = %e, "broker unavailable for job lookup");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryJobBroker, JobRequest};
    use crate::store::{InMemoryTaskStore, TaskStore};
    use ripple_core::UserId;

    async fn setup() -> (Arc<InMemoryJobBroker>, Arc<InMemoryTaskStore>, Task) {
        let broker = Arc::new(InMemoryJobBroker::new());
        let store = Arc::new(InMemoryTaskStore::new());

        let handle = broker
            .enqueue(
                "default",
                JobRequest {
                    name: "demo.count_to_ten".into(),
                    owner: UserId::new(),
                    args: serde_json::Value::Null,
                },
            )
            .await
            .unwrap();

        let task = Task::new(handle.id, "demo.count_to_ten", "count", UserId::new());
        let mut tx = store.begin().await.unwrap();
        tx.insert(&task).await.unwrap();
        tx.commit().await.unwrap();

        (broker, store, task)
    }

    fn ctx(
        task: &Task,
        broker: &Arc<InMemoryJobBroker>,
        store: &Arc<InMemoryTaskStore>,
    ) -> JobContext {
        JobContext::new(
            task.id.clone(),
            broker.clone() as Arc<dyn JobBroker>,
            store.clone() as Arc<dyn TaskStore>,
        )
    }

    #[tokio::test]
    async fn progress_below_100_updates_broker_but_not_complete() {
        let (broker, store, task) = setup().await;
        let ctx = ctx(&task, &broker, &store);

        ctx.set_progress(37).await.unwrap();

        assert_eq!(broker.progress_of(&task.id).await.unwrap(), Some(37));
        assert!(!store.get(&task.id).await.unwrap().unwrap().complete);
    }

    #[tokio::test]
    async fn progress_100_completes_durably_and_idempotently() {
        let (broker, store, task) = setup().await;
        let ctx = ctx(&task, &broker, &store);

        ctx.set_progress(100).await.unwrap();
        assert!(store.get(&task.id).await.unwrap().unwrap().complete);

        // Repeated completion reports leave the flag set.
        ctx.set_progress(100).await.unwrap();
        assert!(store.get(&task.id).await.unwrap().unwrap().complete);
    }

    #[tokio::test]
    async fn over_100_is_clamped() {
        let (broker, store, task) = setup().await;
        let ctx = ctx(&task, &broker, &store);

        ctx.set_progress(250).await.unwrap();
        assert_eq!(broker.progress_of(&task.id).await.unwrap(), Some(100));
        assert!(store.get(&task.id).await.unwrap().unwrap().complete);
    }

    #[tokio::test]
    async fn missing_record_is_logged_and_skipped() {
        let broker = Arc::new(InMemoryJobBroker::new());
        let store = Arc::new(InMemoryTaskStore::new());
        let orphan = JobContext::new(
            JobId::from_string("orphan-job"),
            broker.clone() as Arc<dyn JobBroker>,
            store.clone() as Arc<dyn TaskStore>,
        );

        // Must not error even though no Task row exists.
        orphan.set_progress(100).await.unwrap();
    }

    #[tokio::test]
    async fn evicted_broker_job_reads_as_exactly_100() {
        let (broker, store, task) = setup().await;

        // Durable record says incomplete; the broker has forgotten the job.
        broker.evict(&task.id).await.unwrap();
        let stored = store.get(&task.id).await.unwrap().unwrap();
        assert!(!stored.complete);

        assert_eq!(task_progress(broker.as_ref(), &stored).await, 100);
        assert!(broker_job(broker.as_ref(), &stored).await.is_none());
    }

    #[tokio::test]
    async fn live_job_reports_recorded_progress_defaulting_to_zero() {
        let (broker, _store, task) = setup().await;

        assert_eq!(task_progress(broker.as_ref(), &task).await, 0);

        broker.set_progress(&task.id, 55).await.unwrap();
        assert_eq!(task_progress(broker.as_ref(), &task).await, 55);

        let handle = broker_job(broker.as_ref(), &task).await.unwrap();
        assert_eq!(handle.progress, 55);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// For every progress value below 100, the durable flag stays false.
            #[test]
            fn sub_100_progress_never_completes(p in 0u8..=99) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                rt.block_on(async {
                    let (broker, store, task) = setup().await;
                    let ctx = ctx(&task, &broker, &store);

                    ctx.set_progress(p).await.unwrap();

                    prop_assert_eq!(broker.progress_of(&task.id).await.unwrap(), Some(p));
                    prop_assert!(!store.get(&task.id).await.unwrap().unwrap().complete);
                    Ok(())
                })?;
            }
        }
    }
}

//! Launching background work from the web tier.

use std::sync::Arc;

use ripple_core::UserId;

use crate::broker::{BrokerError, JobBroker, JobRequest};
use crate::store::{TaskStoreError, TaskTransaction};
use crate::task::Task;

/// Launch failure.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The broker refused the job; nothing was staged, so no record exists.
    #[error("enqueue failed: {0}")]
    Enqueue(#[from] BrokerError),
    /// The record could not be staged after a successful enqueue. The queued
    /// job will run without a durable counterpart; the bridge logs and skips.
    #[error("staging task record failed: {0}")]
    Store(#[from] TaskStoreError),
}

/// Fire-and-forget launcher: enqueue on the broker, then stage the durable
/// record, keyed by the broker-assigned job id, into the caller's
/// transaction. The caller commits, so a launch can be part of a larger
/// atomic unit of work.
pub struct TaskLauncher {
    broker: Arc<dyn JobBroker>,
    queue: String,
}

impl TaskLauncher {
    pub fn new(broker: Arc<dyn JobBroker>, queue: impl Into<String>) -> Self {
        Self {
            broker,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Enqueue `name` for `owner` and stage the Task record.
    ///
    /// Order matters: the enqueue happens first, so a broker failure leaves
    /// no record behind (atomic-or-nothing with respect to record creation).
    /// The returned task is staged, not committed.
    pub async fn launch(
        &self,
        tx: &mut dyn TaskTransaction,
        owner: UserId,
        name: &str,
        description: &str,
        args: serde_json::Value,
    ) -> Result<Task, LaunchError> {
        let handle = self
            .broker
            .enqueue(
                &self.queue,
                JobRequest {
                    name: name.to_string(),
                    owner,
                    args,
                },
            )
            .await?;

        tracing::debug!(job_id = %handle.id, name, "job enqueued");

        let task = Task::new(handle.id, name, description, owner);
        tx.insert(&task).await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryJobBroker;
    use crate::store::{InMemoryTaskStore, TaskStore};

    #[tokio::test]
    async fn staged_record_reuses_the_broker_job_id() {
        let broker = Arc::new(InMemoryJobBroker::new());
        let store = InMemoryTaskStore::new();
        let launcher = TaskLauncher::new(broker.clone(), "default");
        let owner = UserId::new();

        let mut tx = store.begin().await.unwrap();
        let task = launcher
            .launch(tx.as_mut(), owner, "example.work", "round trip", serde_json::Value::Null)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // The durable record and the live broker job share one identifier.
        let stored = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.id, task.id);
        assert!(broker.fetch_job(&task.id).await.unwrap().is_some());
        assert!(!stored.complete);
    }

    #[tokio::test]
    async fn same_work_name_for_two_owners_keeps_owners_straight() {
        let broker = Arc::new(InMemoryJobBroker::new());
        let store = InMemoryTaskStore::new();
        let launcher = TaskLauncher::new(broker, "default");
        let alice = UserId::new();
        let bob = UserId::new();

        // Both launches land within the same millisecond; ids must not cross.
        let mut tx = store.begin().await.unwrap();
        let task_a = launcher
            .launch(tx.as_mut(), alice, "demo.export", "", serde_json::Value::Null)
            .await
            .unwrap();
        let task_b = launcher
            .launch(tx.as_mut(), bob, "demo.export", "", serde_json::Value::Null)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_ne!(task_a.id, task_b.id);
        assert_eq!(store.get(&task_a.id).await.unwrap().unwrap().owner, alice);
        assert_eq!(store.get(&task_b.id).await.unwrap().unwrap().owner, bob);
    }

    #[tokio::test]
    async fn launch_stays_uncommitted_until_the_caller_commits() {
        let broker = Arc::new(InMemoryJobBroker::new());
        let store = InMemoryTaskStore::new();
        let launcher = TaskLauncher::new(broker, "default");
        let owner = UserId::new();

        let task = {
            let mut tx = store.begin().await.unwrap();
            let task = launcher
                .launch(tx.as_mut(), owner, "demo.export", "", serde_json::Value::Null)
                .await
                .unwrap();
            // Transaction dropped without commit.
            task
        };

        assert!(store.get(&task.id).await.unwrap().is_none());
    }
}

//! Durable task storage port and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ripple_core::{JobId, UserId};

use crate::task::Task;

/// Durable task store abstraction (read side).
///
/// All writes go through a [`TaskTransaction`] so the *caller* owns the commit
/// boundary: launching stages the record into a transaction the request
/// handler commits, and the progress bridge commits its own.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Open a unit of work. Dropping it without `commit` discards the staged
    /// writes.
    async fn begin(&self) -> Result<Box<dyn TaskTransaction>, TaskStoreError>;

    /// Fetch by id. Unknown id is an absent result, not an error.
    async fn get(&self, id: &JobId) -> Result<Option<Task>, TaskStoreError>;

    /// All incomplete tasks for a user.
    async fn list_incomplete(&self, owner: UserId) -> Result<Vec<Task>, TaskStoreError>;

    /// The incomplete task of a given name for a user, if any. Backs the
    /// duplicate-launch guard; the guard policy itself lives in the caller.
    async fn find_incomplete_by_name(
        &self,
        owner: UserId,
        name: &str,
    ) -> Result<Option<Task>, TaskStoreError>;
}

/// Staged writes against the durable store.
#[async_trait]
pub trait TaskTransaction: Send {
    /// Stage a new record. Not visible to readers until `commit`.
    async fn insert(&mut self, task: &Task) -> Result<(), TaskStoreError>;

    /// Stage `complete = true` for an existing record.
    async fn set_complete(&mut self, id: &JobId) -> Result<(), TaskStoreError>;

    /// Read within this unit of work (sees earlier staged inserts).
    async fn get(&mut self, id: &JobId) -> Result<Option<Task>, TaskStoreError>;

    /// Commit everything staged.
    async fn commit(self: Box<Self>) -> Result<(), TaskStoreError>;
}

/// Task store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    NotFound(JobId),
    #[error("task already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store (dev/test)
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory task store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<Mutex<HashMap<JobId, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
enum StagedWrite {
    Insert(Task),
    SetComplete(JobId),
}

struct InMemoryTaskTransaction {
    tasks: Arc<Mutex<HashMap<JobId, Task>>>,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn begin(&self) -> Result<Box<dyn TaskTransaction>, TaskStoreError> {
        Ok(Box::new(InMemoryTaskTransaction {
            tasks: self.tasks.clone(),
            staged: Vec::new(),
        }))
    }

    async fn get(&self, id: &JobId) -> Result<Option<Task>, TaskStoreError> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn list_incomplete(&self, owner: UserId) -> Result<Vec<Task>, TaskStoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.owner == owner && !t.complete)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(tasks)
    }

    async fn find_incomplete_by_name(
        &self,
        owner: UserId,
        name: &str,
    ) -> Result<Option<Task>, TaskStoreError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .find(|t| t.owner == owner && t.name == name && !t.complete)
            .cloned())
    }
}

#[async_trait]
impl TaskTransaction for InMemoryTaskTransaction {
    async fn insert(&mut self, task: &Task) -> Result<(), TaskStoreError> {
        if self.tasks.lock().unwrap().contains_key(&task.id) {
            return Err(TaskStoreError::AlreadyExists(task.id.clone()));
        }
        self.staged.push(StagedWrite::Insert(task.clone()));
        Ok(())
    }

    async fn set_complete(&mut self, id: &JobId) -> Result<(), TaskStoreError> {
        self.staged.push(StagedWrite::SetComplete(id.clone()));
        Ok(())
    }

    async fn get(&mut self, id: &JobId) -> Result<Option<Task>, TaskStoreError> {
        // Staged inserts shadow the committed state.
        for write in self.staged.iter().rev() {
            if let StagedWrite::Insert(task) = write {
                if &task.id == id {
                    return Ok(Some(task.clone()));
                }
            }
        }
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn commit(self: Box<Self>) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        for write in self.staged {
            match write {
                StagedWrite::Insert(task) => {
                    tasks.insert(task.id.clone(), task);
                }
                StagedWrite::SetComplete(id) => {
                    let task = tasks
                        .get_mut(&id)
                        .ok_or_else(|| TaskStoreError::NotFound(id.clone()))?;
                    task.complete = true;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, name: &str, owner: UserId) -> Task {
        Task::new(JobId::from_string(id), name, format!("{name} job"), owner)
    }

    #[tokio::test]
    async fn staged_insert_is_invisible_until_commit() {
        let store = InMemoryTaskStore::new();
        let owner = UserId::new();
        let id = JobId::from_string("job-1");

        let mut tx = store.begin().await.unwrap();
        tx.insert(&task("job-1", "demo.export", owner)).await.unwrap();

        // Not visible through the store yet, but visible inside the tx.
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(tx.get(&id).await.unwrap().is_some());

        tx.commit().await.unwrap();
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryTaskStore::new();
        let owner = UserId::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&task("job-1", "demo.export", owner)).await.unwrap();
            // dropped without commit
        }

        assert!(store.get(&JobId::from_string("job-1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incomplete_lookups_filter_by_owner_name_and_flag() {
        let store = InMemoryTaskStore::new();
        let alice = UserId::new();
        let bob = UserId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&task("job-1", "demo.export", alice)).await.unwrap();
        tx.insert(&task("job-2", "demo.count_to_ten", alice)).await.unwrap();
        tx.insert(&task("job-3", "demo.export", bob)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.set_complete(&JobId::from_string("job-2")).await.unwrap();
        tx.commit().await.unwrap();

        let incomplete = store.list_incomplete(alice).await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].id.as_str(), "job-1");

        // Duplicate-launch guard lookup: present for alice, absent once the
        // name differs or the task completed.
        let found = store.find_incomplete_by_name(alice, "demo.export").await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(JobId::from_string("job-1")));
        assert!(store
            .find_incomplete_by_name(alice, "demo.count_to_ten")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryTaskStore::new();
        let owner = UserId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&task("job-1", "demo.export", owner)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert(&task("job-1", "demo.export", owner)).await;
        assert!(matches!(err, Err(TaskStoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn set_complete_is_idempotent_across_commits() {
        let store = InMemoryTaskStore::new();
        let owner = UserId::new();
        let id = JobId::from_string("job-1");

        let mut tx = store.begin().await.unwrap();
        tx.insert(&task("job-1", "demo.export", owner)).await.unwrap();
        tx.commit().await.unwrap();

        for _ in 0..2 {
            let mut tx = store.begin().await.unwrap();
            tx.set_complete(&id).await.unwrap();
            tx.commit().await.unwrap();
        }

        assert!(store.get(&id).await.unwrap().unwrap().complete);
    }
}

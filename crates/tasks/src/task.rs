//! Durable task record.

use serde::{Deserialize, Serialize};

use ripple_core::{JobId, UserId};

/// One background job as the durable store sees it.
///
/// # Invariants
/// - `id` equals the identifier the queue broker assigned to the underlying
///   job; the record is never created with a locally minted id.
/// - `complete` starts false and is flipped (once) by the progress bridge when
///   a job reports 100; nothing else writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: JobId,
    /// Dotted work-function reference, e.g. `"demo.count_to_ten"`.
    pub name: String,
    pub description: String,
    pub owner: UserId,
    pub complete: bool,
}

impl Task {
    /// Build the record for a freshly enqueued job.
    pub fn new(
        id: JobId,
        name: impl Into<String>,
        description: impl Into<String>,
        owner: UserId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            owner,
            complete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_incomplete_with_the_broker_id() {
        let id = JobId::from_string("job-123");
        let task = Task::new(id.clone(), "demo.export", "export posts", UserId::new());
        assert_eq!(task.id, id);
        assert!(!task.complete);
    }
}

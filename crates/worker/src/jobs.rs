//! Built-in work functions.
//!
//! Every function here follows the same contract: it receives its execution
//! context (the progress capability, fixed to this job's id) and the dequeued
//! job carrying JSON args. Reporting 100 is what flips the durable record to
//! complete; returning an error marks the broker job failed and leaves the
//! record incomplete.

use std::time::Duration;

use ripple_tasks::{WorkError, WorkRegistry};

/// Registry with every work function this worker ships.
pub fn builtin_registry() -> WorkRegistry {
    let mut registry = WorkRegistry::new();

    registry.register("demo.count_to_ten", |ctx, _job| async move {
        for i in 0..=10u8 {
            ctx.set_progress(i * 10).await?;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(())
    });

    registry.register("demo.sleep", |ctx, job| async move {
        let seconds = job
            .args
            .get("seconds")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .max(1);
        if seconds > 3600 {
            return Err(WorkError::failed("refusing to sleep longer than an hour"));
        }

        ctx.set_progress(0).await?;
        for elapsed in 1..=seconds {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let progress = (elapsed * 100 / seconds) as u8;
            ctx.set_progress(progress).await?;
        }
        ctx.set_progress(100).await?;
        Ok(())
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ripple_core::UserId;
    use ripple_tasks::{
        InMemoryJobBroker, InMemoryTaskStore, TaskLauncher, TaskStore, Worker, WorkerConfig,
    };

    #[tokio::test]
    async fn sleep_job_reads_seconds_from_args_and_completes() {
        let broker = Arc::new(InMemoryJobBroker::new());
        let store = Arc::new(InMemoryTaskStore::new());
        let launcher = TaskLauncher::new(broker.clone(), "default");
        let worker = Worker::new(
            broker.clone(),
            store.clone(),
            Arc::new(builtin_registry()),
            WorkerConfig {
                poll_timeout: Duration::from_millis(50),
                ..WorkerConfig::default()
            },
        );

        let owner = UserId::new();
        let mut tx = store.begin().await.unwrap();
        let task = launcher
            .launch(
                tx.as_mut(),
                owner,
                "demo.sleep",
                "nap",
                serde_json::json!({ "seconds": 1 }),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(worker.run_one().await.unwrap());
        assert!(store.get(&task.id).await.unwrap().unwrap().complete);
    }
}

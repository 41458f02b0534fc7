use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use ripple_infra::{ensure_schema, PostgresTaskStore, RedisJobBroker};
use ripple_tasks::{Worker, WorkerConfig};

/// Worker process entrypoint.
///
/// A worker shares nothing with the web process: it builds its own Postgres
/// pool and Redis client from the environment, registers the work functions
/// that exist in *this* binary, and polls until shutdown.
#[tokio::main]
async fn main() {
    ripple_observability::init();

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for the worker");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let queues: Vec<String> = std::env::var("WORKER_QUEUES")
        .unwrap_or_else(|_| "default".to_string())
        .split(',')
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    let name = std::env::var("WORKER_NAME")
        .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::now_v7()));

    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .expect("failed to connect to Postgres");
    ensure_schema(&pool)
        .await
        .expect("failed to ensure database schema");

    let broker = RedisJobBroker::new(&redis_url).expect("failed to create Redis job broker");

    let worker = Worker::new(
        Arc::new(broker),
        Arc::new(PostgresTaskStore::new(pool)),
        Arc::new(ripple_worker::builtin_registry()),
        WorkerConfig {
            name,
            queues,
            poll_timeout: Duration::from_secs(1),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    worker.run(shutdown_rx).await;
}

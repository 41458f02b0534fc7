use std::sync::Arc;

use ripple_tasks::{InMemoryJobBroker, InMemoryTaskStore, JobBroker, TaskLauncher, TaskStore};
use ripple_users::{InMemoryUserStore, UserStore};

#[cfg(feature = "redis")]
use ripple_infra::{ensure_schema, PostgresTaskStore, PostgresUserStore, RedisJobBroker};
#[cfg(feature = "redis")]
use sqlx::PgPool;

/// Queue that launched tasks land on unless configured otherwise.
pub const DEFAULT_QUEUE: &str = "default";

/// Everything the HTTP handlers need, wired once at startup.
///
/// All collaborators are trait objects so the in-memory and persistent
/// flavors wire identically and tests can share stores with an in-process
/// worker.
pub struct AppServices {
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub broker: Arc<dyn JobBroker>,
    pub launcher: TaskLauncher,
}

impl AppServices {
    pub fn new(
        users: Arc<dyn UserStore>,
        tasks: Arc<dyn TaskStore>,
        broker: Arc<dyn JobBroker>,
        queue: &str,
    ) -> Self {
        let launcher = TaskLauncher::new(broker.clone(), queue);
        Self {
            users,
            tasks,
            broker,
            launcher,
        }
    }

    /// In-memory wiring (dev/test). Single process only: the worker must run
    /// inside the same process to see this broker.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryJobBroker::new()),
            DEFAULT_QUEUE,
        )
    }
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services().await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    }

    tracing::info!("using in-memory stores (single-process; launched jobs need an in-process worker)");
    AppServices::in_memory()
}

#[cfg(feature = "redis")]
async fn build_persistent_services() -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let pool = PgPool::connect(&database_url)
        .await
        .expect("failed to connect to Postgres");
    ensure_schema(&pool)
        .await
        .expect("failed to ensure database schema");

    let broker = RedisJobBroker::new(&redis_url).expect("failed to create Redis job broker");

    AppServices::new(
        Arc::new(PostgresUserStore::new(pool.clone())),
        Arc::new(PostgresTaskStore::new(pool)),
        Arc::new(broker),
        DEFAULT_QUEUE,
    )
}

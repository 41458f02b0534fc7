//! Postgres-backed task store.
//!
//! ## Thread safety
//!
//! Uses the SQLx connection pool (Arc + Send + Sync). Reads run directly
//! against the pool; every write path goes through a real `BEGIN … COMMIT`
//! transaction held by [`PostgresTaskTransaction`], which is what gives the
//! launch path its caller-owned commit boundary.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use ripple_core::{JobId, UserId};
use ripple_tasks::{Task, TaskStore, TaskStoreError, TaskTransaction};

/// Postgres implementation of the durable task store.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_err(e: sqlx::Error) -> TaskStoreError {
    TaskStoreError::Storage(e.to_string())
}

fn row_to_task(row: &PgRow) -> Result<Task, TaskStoreError> {
    let id: String = row.try_get("id").map_err(storage_err)?;
    let name: String = row.try_get("name").map_err(storage_err)?;
    let description: String = row.try_get("description").map_err(storage_err)?;
    let user_id: uuid::Uuid = row.try_get("user_id").map_err(storage_err)?;
    let complete: bool = row.try_get("complete").map_err(storage_err)?;

    Ok(Task {
        id: JobId::from_string(id),
        name,
        description,
        owner: UserId::from_uuid(user_id),
        complete,
    })
}

const SELECT_TASK: &str = "SELECT id, name, description, user_id, complete FROM tasks";

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn begin(&self) -> Result<Box<dyn TaskTransaction>, TaskStoreError> {
        let tx = self.pool.begin().await.map_err(storage_err)?;
        Ok(Box::new(PostgresTaskTransaction { tx }))
    }

    async fn get(&self, id: &JobId) -> Result<Option<Task>, TaskStoreError> {
        let row = sqlx::query(&format!("{SELECT_TASK} WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_incomplete(&self, owner: UserId) -> Result<Vec<Task>, TaskStoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_TASK} WHERE user_id = $1 AND NOT complete ORDER BY id"
        ))
        .bind(owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn find_incomplete_by_name(
        &self,
        owner: UserId,
        name: &str,
    ) -> Result<Option<Task>, TaskStoreError> {
        let row = sqlx::query(&format!(
            "{SELECT_TASK} WHERE user_id = $1 AND name = $2 AND NOT complete LIMIT 1"
        ))
        .bind(owner.as_uuid())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(row_to_task).transpose()
    }
}

/// One durable unit of work. Dropping it without `commit` rolls back.
struct PostgresTaskTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TaskTransaction for PostgresTaskTransaction {
    async fn insert(&mut self, task: &Task) -> Result<(), TaskStoreError> {
        sqlx::query(
            "INSERT INTO tasks (id, name, description, user_id, complete) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(task.id.as_str())
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.owner.as_uuid())
        .bind(task.complete)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => TaskStoreError::AlreadyExists(task.id.clone()),
            _ => storage_err(e),
        })?;
        Ok(())
    }

    async fn set_complete(&mut self, id: &JobId) -> Result<(), TaskStoreError> {
        let result = sqlx::query("UPDATE tasks SET complete = TRUE WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(TaskStoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn get(&mut self, id: &JobId) -> Result<Option<Task>, TaskStoreError> {
        let row = sqlx::query(&format!("{SELECT_TASK} WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), TaskStoreError> {
        self.tx.commit().await.map_err(storage_err)
    }
}

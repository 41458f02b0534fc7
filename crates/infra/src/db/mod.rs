//! Postgres adapters for the durable store.

pub mod postgres_tasks;
pub mod postgres_users;
pub mod schema;

pub use postgres_tasks::PostgresTaskStore;
pub use postgres_users::PostgresUserStore;
pub use schema::ensure_schema;

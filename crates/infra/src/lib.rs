//! Infrastructure layer: Postgres stores, Redis broker, schema bootstrap.

pub mod db;

#[cfg(feature = "redis")]
pub mod redis_broker;

#[cfg(feature = "redis")]
pub use redis_broker::RedisJobBroker;

pub use db::{ensure_schema, PostgresTaskStore, PostgresUserStore};

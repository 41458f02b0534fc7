//! Redis-backed job broker (queue transport + per-job metadata).
//!
//! This implementation uses plain Redis structures:
//! - **Queue transport**: one list per named queue (`LPUSH`/`BRPOP`), so a job
//!   is delivered to at most one of the workers blocked on the list.
//! - **Job metadata**: one hash per job (`ripple:job:<id>`) holding the work
//!   name, owner, args, lifecycle status, and the `progress` field the bridge
//!   writes on every report.
//!
//! The job identifier is minted here at enqueue time; the broker adapter is
//! the only place in the system that creates one.
//!
//! Metadata is broker-lifetime state: terminal jobs get a TTL, and a restarted
//! or flushed Redis simply forgets jobs, which the read path interprets as
//! "nothing left to wait for".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ripple_core::{JobId, UserId};
use ripple_tasks::{BrokerError, JobBroker, JobHandle, JobRequest, JobStatus, QueuedJob};

/// Key prefix for queue lists.
const QUEUE_KEY_PREFIX: &str = "ripple:queue:";

/// Key prefix for per-job metadata hashes.
const JOB_KEY_PREFIX: &str = "ripple:job:";

/// How long a terminal job's metadata survives before Redis drops it.
const RESULT_TTL_SECS: u64 = 500;

#[derive(Debug, Clone)]
pub struct RedisJobBroker {
    client: Arc<redis::Client>,
}

impl RedisJobBroker {
    /// Create a broker from a Redis connection URL
    /// (e.g. "redis://localhost:6379").
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn queue_key(queue: &str) -> String {
        format!("{QUEUE_KEY_PREFIX}{queue}")
    }

    fn job_key(id: &JobId) -> String {
        format!("{JOB_KEY_PREFIX}{id}")
    }

    fn connect(client: &redis::Client) -> Result<redis::Connection, BrokerError> {
        client
            .get_connection()
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    /// Run a synchronous Redis interaction off the async executor.
    async fn blocking<T, F>(&self, f: F) -> Result<T, BrokerError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<redis::Client>) -> Result<T, BrokerError> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || f(client))
            .await
            .map_err(|e| BrokerError::Command(format!("broker task join failed: {e}")))?
    }

    fn parse_job(id: JobId, fields: std::collections::HashMap<String, String>) -> Result<QueuedJob, BrokerError> {
        let name = fields
            .get("name")
            .cloned()
            .ok_or_else(|| BrokerError::Serialization("missing name field".to_string()))?;

        let owner = fields
            .get("owner")
            .and_then(|s| s.parse::<Uuid>().ok())
            .map(UserId::from_uuid)
            .ok_or_else(|| BrokerError::Serialization("missing or invalid owner field".to_string()))?;

        let args = fields
            .get("args")
            .map(|s| serde_json::from_str(s))
            .transpose()
            .map_err(|e| BrokerError::Serialization(format!("invalid args: {e}")))?
            .unwrap_or(serde_json::Value::Null);

        let enqueued_at = fields
            .get("enqueued_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(QueuedJob {
            id,
            name,
            owner,
            args,
            enqueued_at,
        })
    }
}

#[async_trait]
impl JobBroker for RedisJobBroker {
    async fn enqueue(&self, queue: &str, request: JobRequest) -> Result<JobHandle, BrokerError> {
        let queue_key = Self::queue_key(queue);
        let id = JobId::from_string(Uuid::new_v4().to_string());
        let job_key = Self::job_key(&id);
        let id_for_handle = id.clone();

        let args = serde_json::to_string(&request.args)
            .map_err(|e| BrokerError::Serialization(e.to_string()))?;

        self.blocking(move |client| {
            let mut conn = Self::connect(&client)?;

            let _: () = redis::cmd("HSET")
                .arg(&job_key)
                .arg("name")
                .arg(&request.name)
                .arg("owner")
                .arg(request.owner.as_uuid().to_string())
                .arg("args")
                .arg(&args)
                .arg("status")
                .arg(JobStatus::Queued.as_str())
                .arg("enqueued_at")
                .arg(Utc::now().to_rfc3339())
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("HSET failed: {e}")))?;

            let _: () = redis::cmd("LPUSH")
                .arg(&queue_key)
                .arg(id.as_str())
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("LPUSH failed: {e}")))?;

            Ok(())
        })
        .await?;

        Ok(JobHandle {
            id: id_for_handle,
            status: JobStatus::Queued,
            progress: 0,
        })
    }

    async fn dequeue(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> Result<Option<QueuedJob>, BrokerError> {
        let keys: Vec<String> = queues.iter().map(|q| Self::queue_key(q)).collect();
        let timeout_secs = timeout.as_secs().max(1);

        self.blocking(move |client| {
            let mut conn = Self::connect(&client)?;

            // BRPOP takes keys in priority order and blocks until one is
            // non-empty or the timeout elapses.
            let popped: Option<(String, String)> = redis::cmd("BRPOP")
                .arg(&keys)
                .arg(timeout_secs)
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("BRPOP failed: {e}")))?;

            let Some((_, raw_id)) = popped else {
                return Ok(None);
            };
            let id = JobId::from_string(raw_id);

            let fields: std::collections::HashMap<String, String> = redis::cmd("HGETALL")
                .arg(Self::job_key(&id))
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("HGETALL failed: {e}")))?;

            if fields.is_empty() {
                // Metadata evicted while the id sat in the queue; nothing to run.
                return Ok(None);
            }

            Self::parse_job(id, fields).map(Some)
        })
        .await
    }

    async fn mark_status(&self, id: &JobId, status: JobStatus) -> Result<(), BrokerError> {
        let job_key = Self::job_key(id);

        self.blocking(move |client| {
            let mut conn = Self::connect(&client)?;

            let _: () = redis::cmd("HSET")
                .arg(&job_key)
                .arg("status")
                .arg(status.as_str())
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("HSET failed: {e}")))?;

            if status.is_terminal() {
                let _: () = redis::cmd("EXPIRE")
                    .arg(&job_key)
                    .arg(RESULT_TTL_SECS)
                    .query(&mut conn)
                    .map_err(|e| BrokerError::Command(format!("EXPIRE failed: {e}")))?;
            }

            Ok(())
        })
        .await
    }

    async fn set_progress(&self, id: &JobId, progress: u8) -> Result<(), BrokerError> {
        let job_key = Self::job_key(id);
        let progress = progress.min(100);

        self.blocking(move |client| {
            let mut conn = Self::connect(&client)?;
            let _: () = redis::cmd("HSET")
                .arg(&job_key)
                .arg("progress")
                .arg(u32::from(progress))
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("HSET failed: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn progress_of(&self, id: &JobId) -> Result<Option<u8>, BrokerError> {
        let job_key = Self::job_key(id);

        self.blocking(move |client| {
            let mut conn = Self::connect(&client)?;

            let exists: bool = redis::cmd("EXISTS")
                .arg(&job_key)
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("EXISTS failed: {e}")))?;
            if !exists {
                return Ok(None);
            }

            let progress: Option<u32> = redis::cmd("HGET")
                .arg(&job_key)
                .arg("progress")
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("HGET failed: {e}")))?;

            Ok(Some(progress.unwrap_or(0).min(100) as u8))
        })
        .await
    }

    async fn fetch_job(&self, id: &JobId) -> Result<Option<JobHandle>, BrokerError> {
        let job_key = Self::job_key(id);
        let id = id.clone();

        self.blocking(move |client| {
            let mut conn = Self::connect(&client)?;

            let fields: std::collections::HashMap<String, String> = redis::cmd("HGETALL")
                .arg(&job_key)
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("HGETALL failed: {e}")))?;

            if fields.is_empty() {
                return Ok(None);
            }

            let status = fields
                .get("status")
                .and_then(|s| JobStatus::parse(s))
                .unwrap_or(JobStatus::Queued);
            let progress = fields
                .get("progress")
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(0)
                .min(100) as u8;

            Ok(Some(JobHandle {
                id,
                status,
                progress,
            }))
        })
        .await
    }

    async fn evict(&self, id: &JobId) -> Result<(), BrokerError> {
        let job_key = Self::job_key(id);

        self.blocking(move |client| {
            let mut conn = Self::connect(&client)?;
            let _: () = redis::cmd("DEL")
                .arg(&job_key)
                .query(&mut conn)
                .map_err(|e| BrokerError::Command(format!("DEL failed: {e}")))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_queue_and_job() {
        assert_eq!(RedisJobBroker::queue_key("default"), "ripple:queue:default");
        assert_eq!(
            RedisJobBroker::job_key(&JobId::from_string("abc-123")),
            "ripple:job:abc-123"
        );
    }

    #[test]
    fn parse_job_requires_name_and_owner() {
        let owner = UserId::new();
        let mut fields = std::collections::HashMap::new();
        fields.insert("name".to_string(), "demo.export".to_string());
        fields.insert("owner".to_string(), owner.as_uuid().to_string());
        fields.insert("args".to_string(), "{\"n\":10}".to_string());

        let job = RedisJobBroker::parse_job(JobId::from_string("j1"), fields.clone()).unwrap();
        assert_eq!(job.name, "demo.export");
        assert_eq!(job.owner, owner);
        assert_eq!(job.args["n"], 10);

        fields.remove("owner");
        assert!(RedisJobBroker::parse_job(JobId::from_string("j1"), fields).is_err());
    }
}

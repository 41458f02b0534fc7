//! Job queue broker port: transport plus per-job ephemeral metadata.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use ripple_core::{JobId, UserId};

/// What a caller submits: the work-function name, the owning user, and
/// JSON-encoded arguments for the worker side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,
    pub owner: UserId,
    pub args: serde_json::Value,
}

/// Broker-side job lifecycle.
///
/// `queued → running → {succeeded | failed}`; the broker records transitions,
/// it does not drive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Live reference to a queued job, carrying its broker-assigned identifier.
///
/// The id is the only synchronous guarantee of an enqueue; status and progress
/// are snapshots, already stale the moment they are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
}

/// A job as delivered to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub name: String,
    pub owner: UserId,
    pub args: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

/// Broker error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),
    #[error("broker command error: {0}")]
    Command(String),
    #[error("broker serialization error: {0}")]
    Serialization(String),
}

/// Queue broker abstraction.
///
/// One trait covers both concerns the broker owns: queue transport
/// (enqueue/dequeue) and the ephemeral per-job metadata store (status,
/// progress). Ids are assigned here, never by callers.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Push a job onto a named queue. Returns the handle immediately; whether
    /// the work name resolves to anything is the worker's problem, not ours.
    async fn enqueue(&self, queue: &str, request: JobRequest) -> Result<JobHandle, BrokerError>;

    /// Pop the next job from the first non-empty queue in `queues` (priority
    /// order), waiting up to `timeout`. `None` means nothing arrived.
    ///
    /// Each job is delivered to at most one caller.
    async fn dequeue(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> Result<Option<QueuedJob>, BrokerError>;

    /// Record a lifecycle transition in the job's metadata.
    async fn mark_status(&self, id: &JobId, status: JobStatus) -> Result<(), BrokerError>;

    /// Write the job's progress (0–100), persisted immediately so concurrent
    /// readers see it without waiting for any durable commit.
    async fn set_progress(&self, id: &JobId, progress: u8) -> Result<(), BrokerError>;

    /// Progress for a job the broker still knows about: `Some(0)` when the job
    /// exists but never reported, `None` when the broker has no record of it
    /// (expired, evicted, or restarted).
    async fn progress_of(&self, id: &JobId) -> Result<Option<u8>, BrokerError>;

    /// Live handle for a job, or `None` when the broker does not know the id.
    async fn fetch_job(&self, id: &JobId) -> Result<Option<JobHandle>, BrokerError>;

    /// Drop a job's metadata. Retention hook; also what "the broker forgot
    /// this job" looks like to the read path.
    async fn evict(&self, id: &JobId) -> Result<(), BrokerError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory broker (dev/test)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct JobRecord {
    job: QueuedJob,
    status: JobStatus,
    progress: Option<u8>,
}

/// In-memory broker for tests/dev. Single-process only; the real system uses
/// the Redis implementation in `ripple-infra` so the web and worker processes
/// can rendezvous.
#[derive(Debug, Default)]
pub struct InMemoryJobBroker {
    queues: Mutex<HashMap<String, VecDeque<JobId>>>,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    arrival: Notify,
}

impl InMemoryJobBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, queue_names: &[String]) -> Option<QueuedJob> {
        let mut queues = self.queues.lock().unwrap();
        for name in queue_names {
            if let Some(id) = queues.get_mut(name).and_then(VecDeque::pop_front) {
                let jobs = self.jobs.lock().unwrap();
                if let Some(record) = jobs.get(&id) {
                    return Some(record.job.clone());
                }
                // Evicted while queued: skip and keep draining.
            }
        }
        None
    }
}

#[async_trait]
impl JobBroker for InMemoryJobBroker {
    async fn enqueue(&self, queue: &str, request: JobRequest) -> Result<JobHandle, BrokerError> {
        let id = JobId::from_string(Uuid::new_v4().to_string());
        let job = QueuedJob {
            id: id.clone(),
            name: request.name,
            owner: request.owner,
            args: request.args,
            enqueued_at: Utc::now(),
        };

        self.jobs.lock().unwrap().insert(
            id.clone(),
            JobRecord {
                job,
                status: JobStatus::Queued,
                progress: None,
            },
        );
        self.queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_back(id.clone());
        self.arrival.notify_waiters();

        Ok(JobHandle {
            id,
            status: JobStatus::Queued,
            progress: 0,
        })
    }

    async fn dequeue(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> Result<Option<QueuedJob>, BrokerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.try_pop(queues) {
                return Ok(Some(job));
            }
            // Register interest before the final re-check so an enqueue
            // between the two cannot be missed.
            let notified = self.arrival.notified();
            if let Some(job) = self.try_pop(queues) {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_pop(queues));
            }
        }
    }

    async fn mark_status(&self, id: &JobId, status: JobStatus) -> Result<(), BrokerError> {
        if let Some(record) = self.jobs.lock().unwrap().get_mut(id) {
            record.status = status;
        }
        Ok(())
    }

    async fn set_progress(&self, id: &JobId, progress: u8) -> Result<(), BrokerError> {
        if let Some(record) = self.jobs.lock().unwrap().get_mut(id) {
            record.progress = Some(progress.min(100));
        }
        Ok(())
    }

    async fn progress_of(&self, id: &JobId) -> Result<Option<u8>, BrokerError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(id)
            .map(|r| r.progress.unwrap_or(0)))
    }

    async fn fetch_job(&self, id: &JobId) -> Result<Option<JobHandle>, BrokerError> {
        Ok(self.jobs.lock().unwrap().get(id).map(|r| JobHandle {
            id: id.clone(),
            status: r.status,
            progress: r.progress.unwrap_or(0),
        }))
    }

    async fn evict(&self, id: &JobId) -> Result<(), BrokerError> {
        self.jobs.lock().unwrap().remove(id);
        Ok(())
    }
}

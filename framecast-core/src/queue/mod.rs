//! Job queue contract
//!
//! The queue is the single source of truth for job status. Implementations
//! must lease each job to at most one worker at a time, hand out pending jobs
//! in queue order, and never lose a record on a backend error.
//!
//! Status changes are delegated to the `JobRecord` transition methods so every
//! backend applies the same retry policy.

mod memory;

pub use memory::MemoryQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::job::{JobFailure, JobOutput, JobRecord, TransitionError};

/// A submission ready to be enqueued
///
/// The id is chosen by the submitter because the artifact locators are
/// derived from it before the record exists.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: Uuid,
    pub input_ref: String,
    pub output_ref: String,
    pub original_filename: Option<String>,
    pub max_retries: u32,
}

/// Queue error type
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} already exists")]
    Duplicate(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The backend could not be reached or rejected the operation
    #[error("queue backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl QueueError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        QueueError::Backend(Box::new(err))
    }
}

/// Queue operations
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persists a new `Queued` record and appends it to the pending channel
    async fn enqueue(&self, job: NewJob) -> Result<JobRecord, QueueError>;

    /// Atomically reserves the oldest pending job for `worker_id`
    ///
    /// Returns `Ok(None)` when no work is available.
    async fn lease(
        &self,
        worker_id: &str,
        lease_for: Duration,
    ) -> Result<Option<JobRecord>, QueueError>;

    /// Extends the lease held by `worker_id`
    async fn renew(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_for: Duration,
    ) -> Result<JobRecord, QueueError>;

    /// `Running -> Succeeded`
    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        output: JobOutput,
    ) -> Result<JobRecord, QueueError>;

    /// Records a failed attempt; re-appends the job or marks it terminal
    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        failure: JobFailure,
    ) -> Result<JobRecord, QueueError>;

    /// Returns a leased job to its place in the queue without consuming a retry
    async fn release(&self, job_id: Uuid, worker_id: &str) -> Result<JobRecord, QueueError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError>;

    /// Checks that the backend is reachable
    async fn ping(&self) -> Result<(), QueueError>;

    /// Fails every running job whose lease expired before `now`
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, QueueError>;

    /// Removes terminal jobs completed before `before` and returns them
    async fn purge_terminal(&self, before: DateTime<Utc>) -> Result<Vec<JobRecord>, QueueError>;
}

/// Longest lease a worker may hold without renewing
pub const MAX_LEASE: Duration = Duration::from_secs(3600);

/// Converts a lease duration, saturating on overflow
pub fn lease_deadline(now: DateTime<Utc>, lease_for: Duration) -> DateTime<Utc> {
    let delta = chrono::Duration::from_std(lease_for).unwrap_or(chrono::Duration::days(365));
    now + delta
}

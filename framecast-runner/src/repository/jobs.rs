//! Jobs repository
//!
//! Handles communication with the queue for the lifecycle of a leased job:
//! - Leasing the next pending job
//! - Renewing the lease while it runs
//! - Reporting success, failure or release

use async_trait::async_trait;
use framecast_client::{ClientError, OrchestratorClient};
use framecast_core::domain::job::{JobFailure, JobOutput, JobRecord};
use std::time::Duration;
use uuid::Uuid;

/// Repository error type
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The orchestrator or its queue backend could not be reached; try again
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// The queue answered and refused the operation; retrying will not help
    #[error("rejected by queue: {0}")]
    Rejected(String),
}

impl RepositoryError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

impl From<ClientError> for RepositoryError {
    fn from(err: ClientError) -> Self {
        if err.is_unavailable() {
            RepositoryError::Unavailable(err.to_string())
        } else {
            RepositoryError::Rejected(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Repository trait for job-related operations with the queue
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Leases the next pending job; `Ok(None)` means the queue is empty
    async fn lease(&self, lease_for: Duration) -> Result<Option<JobRecord>>;

    /// Extends the lease on a running job
    async fn renew(&self, job_id: Uuid, lease_for: Duration) -> Result<()>;

    /// Reports a successful execution
    async fn complete(&self, job_id: Uuid, output: JobOutput) -> Result<JobRecord>;

    /// Reports a failed execution
    async fn fail(&self, job_id: Uuid, failure: JobFailure) -> Result<JobRecord>;

    /// Hands a leased job back without consuming retry budget
    async fn release(&self, job_id: Uuid) -> Result<()>;
}

/// HTTP implementation of JobRepository
pub struct HttpJobRepository {
    client: OrchestratorClient,
    worker_id: String,
}

impl HttpJobRepository {
    /// Creates a new HTTP job repository
    ///
    /// # Arguments
    /// * `client` - Client pointed at the orchestrator
    /// * `worker_id` - Lease holder identity of this worker
    pub fn new(client: OrchestratorClient, worker_id: String) -> Self {
        Self { client, worker_id }
    }
}

#[async_trait]
impl JobRepository for HttpJobRepository {
    async fn lease(&self, lease_for: Duration) -> Result<Option<JobRecord>> {
        Ok(self.client.lease(&self.worker_id, lease_for).await?)
    }

    async fn renew(&self, job_id: Uuid, lease_for: Duration) -> Result<()> {
        self.client.renew(job_id, &self.worker_id, lease_for).await?;
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, output: JobOutput) -> Result<JobRecord> {
        Ok(self.client.complete(job_id, &self.worker_id, output).await?)
    }

    async fn fail(&self, job_id: Uuid, failure: JobFailure) -> Result<JobRecord> {
        Ok(self.client.fail(job_id, &self.worker_id, failure).await?)
    }

    async fn release(&self, job_id: Uuid) -> Result<()> {
        self.client.release(job_id, &self.worker_id).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) use local::LocalJobRepository;

//! Worker API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use framecast_core::domain::job::{JobFailure, JobOutput, JobRecord};
use framecast_core::dto::worker::{
    CompleteRequest, FailRequest, LeaseRequest, ReleaseRequest, RenewRequest,
};
use reqwest::StatusCode;
use std::time::Duration;
use uuid::Uuid;

impl OrchestratorClient {
    /// Lease the next pending job
    ///
    /// Returns `Ok(None)` when the queue is empty. An unreachable orchestrator
    /// or queue backend is an error, never "no work".
    pub async fn lease(&self, worker_id: &str, lease_for: Duration) -> Result<Option<JobRecord>> {
        let req = LeaseRequest {
            worker_id: worker_id.to_string(),
            lease_secs: lease_for.as_secs(),
        };
        let response = self
            .client
            .post(self.url("/worker/lease"))
            .json(&req)
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        self.read_json(response).await.map(Some)
    }

    /// Extend the lease on a running job
    pub async fn renew(&self, job_id: Uuid, worker_id: &str, lease_for: Duration) -> Result<JobRecord> {
        let req = RenewRequest {
            worker_id: worker_id.to_string(),
            lease_secs: lease_for.as_secs(),
        };
        let response = self
            .client
            .post(self.url(&format!("/worker/jobs/{}/renew", job_id)))
            .json(&req)
            .send()
            .await?;

        self.read_json(response).await
    }

    /// Report a successful execution
    pub async fn complete(&self, job_id: Uuid, worker_id: &str, result: JobOutput) -> Result<JobRecord> {
        let req = CompleteRequest {
            worker_id: worker_id.to_string(),
            result,
        };
        let response = self
            .client
            .post(self.url(&format!("/worker/jobs/{}/complete", job_id)))
            .json(&req)
            .send()
            .await?;

        self.read_json(response).await
    }

    /// Report a failed execution; the orchestrator decides retry or terminal
    pub async fn fail(&self, job_id: Uuid, worker_id: &str, failure: JobFailure) -> Result<JobRecord> {
        let req = FailRequest {
            worker_id: worker_id.to_string(),
            failure,
        };
        let response = self
            .client
            .post(self.url(&format!("/worker/jobs/{}/fail", job_id)))
            .json(&req)
            .send()
            .await?;

        self.read_json(response).await
    }

    /// Hand a leased job back to the queue without consuming a retry
    pub async fn release(&self, job_id: Uuid, worker_id: &str) -> Result<JobRecord> {
        let req = ReleaseRequest {
            worker_id: worker_id.to_string(),
        };
        let response = self
            .client
            .post(self.url(&format!("/worker/jobs/{}/release", job_id)))
            .json(&req)
            .send()
            .await?;

        self.read_json(response).await
    }
}

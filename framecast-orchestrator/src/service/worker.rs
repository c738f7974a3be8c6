//! Worker Service
//!
//! Lease lifecycle operations requested by runners.

use framecast_core::domain::job::{JobFailure, JobOutput, JobRecord, JobStatus};
use framecast_core::queue::{MAX_LEASE, QueueError};
use std::time::Duration;
use uuid::Uuid;

use crate::state::AppState;

fn clamp_lease(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1)).min(MAX_LEASE)
}

pub async fn lease(
    state: &AppState,
    worker_id: &str,
    lease_secs: u64,
) -> Result<Option<JobRecord>, QueueError> {
    let job = state.queue.lease(worker_id, clamp_lease(lease_secs)).await?;

    if let Some(job) = &job {
        state.executions.begin(job.id);
        tracing::info!(
            job_id = %job.id,
            worker_id,
            retry_count = job.retry_count,
            "Job leased"
        );
    }

    Ok(job)
}

pub async fn renew(
    state: &AppState,
    job_id: Uuid,
    worker_id: &str,
    lease_secs: u64,
) -> Result<JobRecord, QueueError> {
    let job = state
        .queue
        .renew(job_id, worker_id, clamp_lease(lease_secs))
        .await?;
    tracing::debug!(job_id = %job_id, worker_id, "Lease renewed");
    Ok(job)
}

pub async fn complete(
    state: &AppState,
    job_id: Uuid,
    worker_id: &str,
    output: JobOutput,
) -> Result<JobRecord, QueueError> {
    let job = state.queue.complete(job_id, worker_id, output).await?;
    state.executions.finish(job_id, true);
    tracing::info!(job_id = %job_id, worker_id, output = %job.output_ref, "Job succeeded");
    Ok(job)
}

pub async fn fail(
    state: &AppState,
    job_id: Uuid,
    worker_id: &str,
    failure: JobFailure,
) -> Result<JobRecord, QueueError> {
    let job = state.queue.fail(job_id, worker_id, failure).await?;
    state.executions.finish(job_id, false);

    match job.status {
        JobStatus::Queued => tracing::warn!(
            job_id = %job_id,
            worker_id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            error = job.last_error.as_deref().unwrap_or_default(),
            "Job attempt failed, re-queued"
        ),
        _ => tracing::error!(
            job_id = %job_id,
            worker_id,
            error = job.error.as_deref().unwrap_or_default(),
            "Job failed"
        ),
    }

    Ok(job)
}

pub async fn release(state: &AppState, job_id: Uuid, worker_id: &str) -> Result<JobRecord, QueueError> {
    let job = state.queue.release(job_id, worker_id).await?;
    // An interrupted attempt ends as a failed execution
    state.executions.finish(job_id, false);
    tracing::info!(job_id = %job_id, worker_id, "Job released back to the queue");
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_lease() {
        assert_eq!(clamp_lease(0), Duration::from_secs(1));
        assert_eq!(clamp_lease(30), Duration::from_secs(30));
        assert_eq!(clamp_lease(u64::MAX), MAX_LEASE);
    }
}

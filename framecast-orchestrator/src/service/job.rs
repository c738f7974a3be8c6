//! Job Service
//!
//! Submission, the status oracle and result lookup.

use framecast_core::domain::artifact::VideoFormat;
use framecast_core::domain::job::{JobRecord, JobStatus};
use framecast_core::dto::job::{ReportedStatus, StatusResponse};
use framecast_core::queue::{NewJob, QueueError};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::state::AppState;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    InvalidUpload(String),

    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Outcome of a result lookup
#[derive(Debug)]
pub enum ResultLookup {
    /// The artifact is on disk and can be served
    Ready {
        path: PathBuf,
        size: u64,
        content_type: &'static str,
    },
    /// The job has not finished yet
    Pending(ReportedStatus),
    /// The job failed terminally
    Failed(String),
    /// The job succeeded but its artifact is gone
    Missing,
    NotFound,
}

/// Stores the upload and enqueues a new job for it
pub async fn submit(
    state: &AppState,
    filename: Option<&str>,
    bytes: &[u8],
) -> Result<JobRecord, JobError> {
    if bytes.is_empty() {
        return Err(JobError::InvalidUpload("Uploaded image is empty".to_string()));
    }

    if let Err(e) = image::guess_format(bytes) {
        return Err(JobError::InvalidUpload(format!(
            "Upload is not a supported image: {}",
            e
        )));
    }

    let id = Uuid::new_v4();
    let artifacts = state.store.artifacts_for(id, filename);
    state.store.save_upload(&artifacts.input, bytes).await?;

    let new_job = NewJob {
        id,
        input_ref: artifacts.input.to_string_lossy().into_owned(),
        output_ref: artifacts.output.to_string_lossy().into_owned(),
        original_filename: filename.map(str::to_string),
        max_retries: state.config.max_retries,
    };

    let job = match state.queue.enqueue(new_job).await {
        Ok(job) => job,
        Err(e) => {
            // Nothing references the upload once enqueue has failed
            if let Err(rm) = state.store.remove(&artifacts.input).await {
                tracing::warn!(job_id = %id, error = %rm, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    state.metrics.job_created();
    tracing::info!(job_id = %job.id, input = %job.input_ref, "Job created");

    Ok(job)
}

/// Reports the current status of a job
///
/// Unknown ids and an unreachable backend both read as `not_found`; the
/// latter is logged so it is distinguishable in operation.
pub async fn status(state: &AppState, id: Uuid) -> StatusResponse {
    match state.queue.get(id).await {
        Ok(Some(job)) => StatusResponse::from(job),
        Ok(None) => StatusResponse::not_found(id),
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "Queue backend unavailable during status lookup");
            StatusResponse::not_found(id)
        }
    }
}

/// Resolves the produced artifact of a job
pub async fn result(state: &AppState, id: Uuid) -> ResultLookup {
    let job = match state.queue.get(id).await {
        Ok(Some(job)) => job,
        Ok(None) => return ResultLookup::NotFound,
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "Queue backend unavailable during result lookup");
            return ResultLookup::NotFound;
        }
    };

    match job.status {
        JobStatus::Queued | JobStatus::Running => ResultLookup::Pending(job.status.into()),
        JobStatus::Failed => ResultLookup::Failed(
            job.error
                .unwrap_or_else(|| "Job failed without an error message".to_string()),
        ),
        JobStatus::Succeeded => {
            let path = PathBuf::from(&job.output_ref);
            match state.store.artifact_size(&path).await {
                Some(size) => {
                    let content_type = VideoFormat::from_path(Path::new(&job.output_ref))
                        .map(|f| f.content_type())
                        .unwrap_or("application/octet-stream");
                    ResultLookup::Ready {
                        path,
                        size,
                        content_type,
                    }
                }
                None => {
                    tracing::warn!(job_id = %id, path = %job.output_ref, "Succeeded job has no artifact");
                    ResultLookup::Missing
                }
            }
        }
    }
}

/// Reports whether the queue backend is reachable
pub async fn healthy(state: &AppState) -> bool {
    match state.queue.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            false
        }
    }
}

//! Client-facing job DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{JobOutput, JobRecord, JobStatus};

/// Status as reported to clients
///
/// Adds `NotFound` to the stored statuses; it means no record exists, which
/// is distinct from a job that ran and failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    NotFound,
}

impl From<JobStatus> for ReportedStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => ReportedStatus::Queued,
            JobStatus::Running => ReportedStatus::Running,
            JobStatus::Succeeded => ReportedStatus::Succeeded,
            JobStatus::Failed => ReportedStatus::Failed,
        }
    }
}

impl std::fmt::Display for ReportedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportedStatus::Queued => "queued",
            ReportedStatus::Running => "running",
            ReportedStatus::Succeeded => "succeeded",
            ReportedStatus::Failed => "failed",
            ReportedStatus::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// Response to an accepted upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub status: JobStatus,
    pub output_ref: String,
}

/// Response to a status query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub task_id: Uuid,
    pub status: ReportedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn not_found(task_id: Uuid) -> Self {
        Self {
            task_id,
            status: ReportedStatus::NotFound,
            output_ref: None,
            retry_count: None,
            result: None,
            error: None,
        }
    }
}

impl From<JobRecord> for StatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            task_id: job.id,
            status: job.status.into(),
            output_ref: Some(job.output_ref),
            retry_count: Some(job.retry_count),
            result: job.result,
            error: job.error,
        }
    }
}

/// Body returned by the results endpoint when no artifact can be served
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultUnavailable {
    pub task_id: Uuid,
    pub status: ReportedStatus,
    pub error: String,
}

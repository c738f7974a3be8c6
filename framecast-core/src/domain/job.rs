//! Job domain types
//!
//! A `JobRecord` is the durable unit of work. All status changes go through
//! the transition methods below so that the orchestrator's Postgres queue and
//! the in-memory queue share one state machine and one retry decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job execution status
///
/// Allowed transitions: `Queued -> Running -> {Succeeded | Failed}`, plus
/// `Running -> Queued` when a failure is retried or a lease is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
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

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Metadata about a produced video, stored on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub output_ref: String,
    pub size_bytes: u64,
    pub frame_count: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Wall-clock time spent in the execution pipeline
    pub elapsed_ms: u64,
}

/// Classification of an execution failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Model invocation error, I/O hiccup, expired lease
    Transient,
    /// The input artifact no longer exists
    InputMissing,
    /// The input artifact exists but cannot be decoded
    InvalidInput,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

/// A failed attempt as reported to the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    /// Short human-readable cause, never a backtrace
    pub message: String,
}

impl JobFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn input_missing(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InputMissing,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            message: message.into(),
        }
    }

    pub fn lease_expired() -> Self {
        Self::transient("lease expired before the job was reported")
    }
}

/// What the queue did with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Budget left: the job went back to `Queued`
    Requeued { retry_count: u32 },
    /// Budget exhausted or failure not retryable: the job is `Failed`
    Terminal,
}

/// Rejected state transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("job {id} cannot be {action} while {status}")]
    InvalidState {
        id: Uuid,
        status: JobStatus,
        action: &'static str,
    },

    #[error("job {id} is not leased by worker '{worker_id}'")]
    NotLeaseHolder { id: Uuid, worker_id: String },
}

/// Job execution record
///
/// Structure shared between orchestrator (persists) and runner (executes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    /// Absolute path of the uploaded image
    pub input_ref: String,
    /// Absolute path the video will be written to, known from submission
    pub output_ref: String,
    pub original_filename: Option<String>,
    pub status: JobStatus,
    /// Retries consumed so far
    pub retry_count: u32,
    pub max_retries: u32,
    /// Present only when `Succeeded`
    pub result: Option<JobOutput>,
    /// Present only when `Failed`
    pub error: Option<String>,
    /// Cause of the most recent failed attempt, kept across retries
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Builds a freshly submitted record in `Queued` state
    pub fn new(
        id: Uuid,
        input_ref: String,
        output_ref: String,
        original_filename: Option<String>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            input_ref,
            output_ref,
            original_filename,
            status: JobStatus::Queued,
            retry_count: 0,
            max_retries,
            result: None,
            error: None,
            last_error: None,
            worker_id: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            lease_expires_at: None,
        }
    }

    /// Leases the job: `Queued -> Running`
    pub fn start(
        &mut self,
        worker_id: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.expect_status(JobStatus::Queued, "leased")?;
        self.status = JobStatus::Running;
        self.worker_id = Some(worker_id.to_string());
        self.started_at = Some(now);
        self.lease_expires_at = Some(lease_until);
        Ok(())
    }

    /// Extends the lease of a running job
    pub fn renew(&mut self, lease_until: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect_status(JobStatus::Running, "renewed")?;
        self.lease_expires_at = Some(lease_until);
        Ok(())
    }

    /// `Running -> Succeeded`
    pub fn succeed(&mut self, output: JobOutput, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect_status(JobStatus::Running, "completed")?;
        self.status = JobStatus::Succeeded;
        self.result = Some(output);
        self.error = None;
        self.completed_at = Some(now);
        self.lease_expires_at = None;
        Ok(())
    }

    /// Records a failed attempt and decides between retry and terminal failure
    ///
    /// This is the only place the retry policy lives. A retryable failure
    /// with `retry_count < max_retries` consumes one retry and re-queues the
    /// job; anything else is terminal and leaves `retry_count` unchanged.
    pub fn record_failure(
        &mut self,
        failure: &JobFailure,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, TransitionError> {
        self.expect_status(JobStatus::Running, "failed")?;
        self.last_error = Some(failure.message.clone());
        self.lease_expires_at = None;

        if failure.kind.is_retryable() && self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.status = JobStatus::Queued;
            self.worker_id = None;
            return Ok(FailureOutcome::Requeued {
                retry_count: self.retry_count,
            });
        }

        self.status = JobStatus::Failed;
        self.error = Some(failure.message.clone());
        self.completed_at = Some(now);
        Ok(FailureOutcome::Terminal)
    }

    /// Abandons a lease without consuming retry budget: `Running -> Queued`
    pub fn release(&mut self) -> Result<(), TransitionError> {
        self.expect_status(JobStatus::Running, "released")?;
        self.status = JobStatus::Queued;
        self.worker_id = None;
        self.started_at = None;
        self.lease_expires_at = None;
        Ok(())
    }

    /// Fails unless `worker_id` holds the current lease
    pub fn ensure_held_by(&self, worker_id: &str) -> Result<(), TransitionError> {
        if self.status == JobStatus::Running && self.worker_id.as_deref() == Some(worker_id) {
            Ok(())
        } else {
            Err(TransitionError::NotLeaseHolder {
                id: self.id,
                worker_id: worker_id.to_string(),
            })
        }
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Running && self.lease_expires_at.is_some_and(|at| at <= now)
    }

    fn expect_status(&self, expected: JobStatus, action: &'static str) -> Result<(), TransitionError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TransitionError::InvalidState {
                id: self.id,
                status: self.status,
                action,
            })
        }
    }
}

//! Worker DTOs
//!
//! Requests sent by runners to the orchestrator's worker endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobFailure, JobOutput};

/// Request the next pending job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRequest {
    pub worker_id: String,
    /// Lease duration in seconds
    pub lease_secs: u64,
}

/// Extend the lease on a running job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewRequest {
    pub worker_id: String,
    pub lease_secs: u64,
}

/// Report a successful execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub worker_id: String,
    pub result: JobOutput,
}

/// Report a failed execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailRequest {
    pub worker_id: String,
    pub failure: JobFailure,
}

/// Hand a leased job back without consuming retry budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub worker_id: String,
}

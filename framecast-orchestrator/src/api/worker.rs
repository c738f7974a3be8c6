//! Worker API Handlers
//!
//! Endpoints used by runners to lease jobs and report their outcome.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use framecast_core::domain::job::JobRecord;
use framecast_core::dto::worker::{
    CompleteRequest, FailRequest, LeaseRequest, ReleaseRequest, RenewRequest,
};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::worker as worker_service;
use crate::state::AppState;

fn require_worker_id(worker_id: &str) -> ApiResult<()> {
    if worker_id.trim().is_empty() {
        return Err(ApiError::BadRequest("worker_id cannot be empty".to_string()));
    }
    Ok(())
}

/// POST /worker/lease
/// Lease the oldest pending job; 204 when there is none
pub async fn lease(State(state): State<AppState>, Json(req): Json<LeaseRequest>) -> ApiResult<Response> {
    require_worker_id(&req.worker_id)?;

    match worker_service::lease(&state, &req.worker_id, req.lease_secs).await? {
        Some(job) => Ok(Json(job).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /worker/jobs/{id}/renew
pub async fn renew(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RenewRequest>,
) -> ApiResult<Json<JobRecord>> {
    require_worker_id(&req.worker_id)?;
    let job = worker_service::renew(&state, id, &req.worker_id, req.lease_secs).await?;
    Ok(Json(job))
}

/// POST /worker/jobs/{id}/complete
pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<Json<JobRecord>> {
    require_worker_id(&req.worker_id)?;
    let job = worker_service::complete(&state, id, &req.worker_id, req.result).await?;
    Ok(Json(job))
}

/// POST /worker/jobs/{id}/fail
pub async fn fail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FailRequest>,
) -> ApiResult<Json<JobRecord>> {
    require_worker_id(&req.worker_id)?;
    let job = worker_service::fail(&state, id, &req.worker_id, req.failure).await?;
    Ok(Json(job))
}

/// POST /worker/jobs/{id}/release
pub async fn release(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReleaseRequest>,
) -> ApiResult<Json<JobRecord>> {
    require_worker_id(&req.worker_id)?;
    let job = worker_service::release(&state, id, &req.worker_id).await?;
    Ok(Json(job))
}

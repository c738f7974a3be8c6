//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use framecast_core::queue::QueueError;

use crate::service::job::JobError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    PayloadTooLarge(String),
    QueueUnavailable(QueueError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::QueueUnavailable(err) => {
                tracing::error!("Queue backend error: {}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Queue backend unavailable".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            QueueError::Duplicate(_) | QueueError::Transition(_) => {
                ApiError::Conflict(err.to_string())
            }
            QueueError::Backend(_) => ApiError::QueueUnavailable(err),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidUpload(msg) => ApiError::BadRequest(msg),
            JobError::Storage(e) => ApiError::InternalError(format!("Failed to store upload: {}", e)),
            JobError::Queue(e) => e.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

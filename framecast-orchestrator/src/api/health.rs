use axum::{Json, extract::State, http::StatusCode};
use framecast_core::dto::health::{HealthResponse, HealthStatus};

use crate::service::job as job_service;
use crate::state::AppState;

/// GET /health
/// Reports `ok` while the queue backend answers, `unhealthy` otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if job_service::healthy(&state).await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: HealthStatus::Ok,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: HealthStatus::Unhealthy,
            }),
        )
    }
}

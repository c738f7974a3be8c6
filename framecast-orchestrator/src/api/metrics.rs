use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use framecast_core::metrics::MetricsSnapshot;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
/// Snapshot of this process's job counters
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// GET /metrics/prometheus
/// Prometheus text exposition of everything recorded through the facade
pub async fn get_prometheus(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let handle = state
        .prometheus
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Prometheus exporter is not installed".to_string()))?;

    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], handle.render()))
}

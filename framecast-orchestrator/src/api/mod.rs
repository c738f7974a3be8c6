//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;
pub mod metrics;
pub mod worker;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        // Health and metrics
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::get_metrics))
        .route("/metrics/prometheus", get(metrics::get_prometheus))
        // Client endpoints
        .route(
            "/generate",
            post(job::generate).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/status/{id}", get(job::get_status))
        .route("/results/{id}", get(job::get_result))
        // Worker endpoints
        .route("/worker/lease", post(worker::lease))
        .route("/worker/jobs/{id}/renew", post(worker::renew))
        .route("/worker/jobs/{id}/complete", post(worker::complete))
        .route("/worker/jobs/{id}/fail", post(worker::fail))
        .route("/worker/jobs/{id}/release", post(worker::release))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chrono::{DateTime, Utc};
    use framecast_core::domain::job::{FailureKind, JobFailure, JobOutput, JobRecord, JobStatus};
    use framecast_core::dto::worker::{CompleteRequest, FailRequest, LeaseRequest, ReleaseRequest};
    use framecast_core::queue::{JobQueue, MemoryQueue, NewJob, QueueError};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
    use serde_json::Value;
    use std::path::Path;
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    const PNG_BYTES: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, b'I', b'H', b'D', b'R',
    ];
    const BOUNDARY: &str = "framecast-test-boundary";

    fn test_state(dir: &Path, queue: Arc<dyn JobQueue>) -> AppState {
        let config = Config {
            upload_dir: dir.join("uploads"),
            results_dir: dir.join("results"),
            max_retries: 2,
            max_upload_bytes: 1024,
            ..Config::default()
        };
        AppState::new(queue, config)
    }

    async fn app(dir: &Path) -> (Router, AppState) {
        let state = test_state(dir, Arc::new(MemoryQueue::new()));
        state.store.ensure_dirs().await.unwrap();
        (create_router(state.clone()), state)
    }

    fn multipart(field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/generate")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn post_json(uri: &str, body: &impl serde::Serialize) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn submit(app: &Router) -> Uuid {
        let response = app
            .clone()
            .oneshot(multipart("image", "cat.png", PNG_BYTES))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json(response).await;
        body["task_id"].as_str().unwrap().parse().unwrap()
    }

    async fn lease(app: &Router, worker_id: &str) -> Option<JobRecord> {
        let response = app
            .clone()
            .oneshot(post_json(
                "/worker/lease",
                &LeaseRequest {
                    worker_id: worker_id.to_string(),
                    lease_secs: 60,
                },
            ))
            .await
            .unwrap();

        match response.status() {
            StatusCode::NO_CONTENT => None,
            StatusCode::OK => {
                let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
                Some(serde_json::from_slice(&bytes).unwrap())
            }
            other => panic!("unexpected lease status {other}"),
        }
    }

    #[tokio::test]
    async fn test_health_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path()).await;

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_submit_then_status_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app(dir.path()).await;

        let id = submit(&app).await;

        let response = app.clone().oneshot(get(&format!("/status/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["task_id"], id.to_string());
        assert_eq!(body["status"], "queued");
        assert_eq!(body["retry_count"], 0);

        assert_eq!(state.metrics.snapshot().jobs_created, 1);
    }

    #[tokio::test]
    async fn test_status_of_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path()).await;
        let id = Uuid::new_v4();

        let response = app.clone().oneshot(get(&format!("/status/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "not_found");

        let response = app.oneshot(get(&format!("/results/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["status"], "not_found");
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path()).await;

        let response = app
            .clone()
            .oneshot(multipart("file", "cat.png", PNG_BYTES))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(multipart("image", "notes.txt", b"plain text"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let oversized = [PNG_BYTES, &[0u8; 2048]].concat();
        let response = app
            .oneshot(multipart("image", "big.png", &oversized))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_full_lifecycle_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app(dir.path()).await;
        let id = submit(&app).await;

        let response = app.clone().oneshot(get(&format!("/results/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let job = lease(&app, "w1").await.unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(state.metrics.snapshot().jobs_in_progress, 1);

        tokio::fs::write(&job.output_ref, b"fake video").await.unwrap();
        let output = JobOutput {
            output_ref: job.output_ref.clone(),
            size_bytes: 10,
            frame_count: 25,
            fps: 7,
            width: 1024,
            height: 576,
            elapsed_ms: 1500,
        };
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/worker/jobs/{id}/complete"),
                &CompleteRequest {
                    worker_id: "w1".to_string(),
                    result: output,
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get(&format!("/status/{id}"))).await.unwrap();
        let body = json(response).await;
        assert_eq!(body["status"], "succeeded");
        assert_eq!(body["result"]["frame_count"], 25);

        let response = app.clone().oneshot(get(&format!("/results/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"fake video");

        let response = app.oneshot(get("/metrics")).await.unwrap();
        let body = json(response).await;
        assert_eq!(body["jobs_created"], 1);
        assert_eq!(body["jobs_completed"], 1);
        assert_eq!(body["jobs_in_progress"], 0);
    }

    /// The process-wide recorder, installed once for every test that needs it
    fn prometheus() -> PrometheusHandle {
        static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
        HANDLE
            .get_or_init(|| PrometheusBuilder::new().install_recorder().unwrap())
            .clone()
    }

    #[tokio::test]
    async fn test_prometheus_exposition_lists_job_counters() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), Arc::new(MemoryQueue::new())).with_prometheus(prometheus());
        state.store.ensure_dirs().await.unwrap();
        let app = create_router(state);

        submit(&app).await;

        let response = app.oneshot(get("/metrics/prometheus")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.lines().any(|line| line.starts_with("jobs_created ")));
    }

    #[tokio::test]
    async fn test_prometheus_without_exporter_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path()).await;
        let response = app.oneshot(get("/metrics/prometheus")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lease_on_empty_queue_is_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path()).await;
        assert!(lease(&app, "w1").await.is_none());
    }

    #[tokio::test]
    async fn test_worker_endpoints_enforce_lease_holder() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path()).await;
        let id = submit(&app).await;
        lease(&app, "w1").await.unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/worker/jobs/{id}/release"),
                &ReleaseRequest {
                    worker_id: "w2".to_string(),
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let unknown = Uuid::new_v4();
        let response = app
            .oneshot(post_json(
                &format!("/worker/jobs/{unknown}/fail"),
                &FailRequest {
                    worker_id: "w1".to_string(),
                    failure: JobFailure::transient("boom"),
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_job_result_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app(dir.path()).await;
        let id = submit(&app).await;
        lease(&app, "w1").await.unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/worker/jobs/{id}/fail"),
                &FailRequest {
                    worker_id: "w1".to_string(),
                    failure: JobFailure {
                        kind: FailureKind::InputMissing,
                        message: "Input image not found".to_string(),
                    },
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get(&format!("/results/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json(response).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["error"], "Input image not found");

        assert!(lease(&app, "w1").await.is_none());
        assert_eq!(state.metrics.snapshot().jobs_failed, 1);
    }

    /// Queue whose backend is permanently unreachable
    struct DownQueue;

    fn down() -> QueueError {
        QueueError::backend(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))
    }

    #[async_trait]
    impl JobQueue for DownQueue {
        async fn enqueue(&self, _: NewJob) -> Result<JobRecord, QueueError> {
            Err(down())
        }
        async fn lease(&self, _: &str, _: Duration) -> Result<Option<JobRecord>, QueueError> {
            Err(down())
        }
        async fn renew(&self, _: Uuid, _: &str, _: Duration) -> Result<JobRecord, QueueError> {
            Err(down())
        }
        async fn complete(&self, _: Uuid, _: &str, _: JobOutput) -> Result<JobRecord, QueueError> {
            Err(down())
        }
        async fn fail(&self, _: Uuid, _: &str, _: JobFailure) -> Result<JobRecord, QueueError> {
            Err(down())
        }
        async fn release(&self, _: Uuid, _: &str) -> Result<JobRecord, QueueError> {
            Err(down())
        }
        async fn get(&self, _: Uuid) -> Result<Option<JobRecord>, QueueError> {
            Err(down())
        }
        async fn ping(&self) -> Result<(), QueueError> {
            Err(down())
        }
        async fn reclaim_expired(&self, _: DateTime<Utc>) -> Result<Vec<JobRecord>, QueueError> {
            Err(down())
        }
        async fn purge_terminal(&self, _: DateTime<Utc>) -> Result<Vec<JobRecord>, QueueError> {
            Err(down())
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), Arc::new(DownQueue));
        state.store.ensure_dirs().await.unwrap();
        let app = create_router(state.clone());

        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["status"], "unhealthy");

        // Submission faults rather than pretending to succeed
        let response = app
            .clone()
            .oneshot(multipart("image", "cat.png", PNG_BYTES))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.metrics.snapshot().jobs_created, 0);

        // Leasing faults rather than reporting "no work"
        let response = app
            .clone()
            .oneshot(post_json(
                "/worker/lease",
                &LeaseRequest {
                    worker_id: "w1".to_string(),
                    lease_secs: 60,
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let id = Uuid::new_v4();
        let response = app.oneshot(get(&format!("/status/{id}"))).await.unwrap();
        assert_eq!(json(response).await["status"], "not_found");
    }
}

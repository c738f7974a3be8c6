//! Client-facing API endpoints

use crate::OrchestratorClient;
use crate::error::{ClientError, Result};
use framecast_core::dto::health::HealthResponse;
use framecast_core::dto::job::{ResultUnavailable, StatusResponse, SubmitResponse};
use framecast_core::metrics::MetricsSnapshot;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Outcome of a result download
#[derive(Debug)]
pub enum ResultDownload {
    /// The video was written to `path`
    Saved {
        path: PathBuf,
        bytes: u64,
        content_type: Option<String>,
    },
    /// The orchestrator explained why no video is available
    Unavailable(ResultUnavailable),
}

impl OrchestratorClient {
    // =============================================================================
    // Submission and Status
    // =============================================================================

    /// Upload an image file and enqueue a generation job
    pub async fn submit_file(&self, path: impl AsRef<Path>) -> Result<SubmitResponse> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        self.submit_bytes(filename, bytes).await
    }

    /// Upload in-memory image bytes and enqueue a generation job
    pub async fn submit_bytes(&self, filename: impl Into<String>, bytes: Vec<u8>) -> Result<SubmitResponse> {
        let form = Form::new().part("image", Part::bytes(bytes).file_name(filename.into()));
        let response = self
            .client
            .post(self.url("/generate"))
            .multipart(form)
            .send()
            .await?;

        self.read_json(response).await
    }

    /// Get the status of a job; unknown ids come back as `not_found`
    pub async fn get_status(&self, job_id: Uuid) -> Result<StatusResponse> {
        let response = self
            .client
            .get(self.url(&format!("/status/{}", job_id)))
            .send()
            .await?;

        self.read_json(response).await
    }

    /// Download the generated video of a job into `dest`
    ///
    /// The body is streamed to a temporary sibling and renamed into place, so
    /// `dest` only ever holds a complete file.
    pub async fn download_result(&self, job_id: Uuid, dest: impl AsRef<Path>) -> Result<ResultDownload> {
        let dest = dest.as_ref();
        let mut response = self
            .client
            .get(self.url(&format!("/results/{}", job_id)))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::ACCEPTED | StatusCode::NOT_FOUND | StatusCode::CONFLICT => {
                let body: ResultUnavailable = response.json().await.map_err(|e| {
                    ClientError::ParseError(format!("Failed to parse result response: {}", e))
                })?;
                return Ok(ResultDownload::Unavailable(body));
            }
            _ => return Err(Self::api_error(response).await),
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let tmp = dest.with_extension("download");
        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut written = 0u64;

        let copied: Result<()> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copied {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tokio::fs::rename(&tmp, dest).await?;
        tracing::debug!(job_id = %job_id, bytes = written, path = %dest.display(), "Result downloaded");

        Ok(ResultDownload::Saved {
            path: dest.to_path_buf(),
            bytes: written,
            content_type,
        })
    }

    // =============================================================================
    // Health and Metrics
    // =============================================================================

    /// Check orchestrator health
    ///
    /// An unhealthy orchestrator answers 503 with a body, which is returned
    /// as a normal response.
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.client.get(self.url("/health")).send().await?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return response
                .json()
                .await
                .map_err(|e| ClientError::ParseError(format!("Failed to parse health response: {}", e)));
        }

        self.read_json(response).await
    }

    /// Fetch the orchestrator's metrics snapshot
    pub async fn metrics(&self) -> Result<MetricsSnapshot> {
        let response = self.client.get(self.url("/metrics")).send().await?;
        self.read_json(response).await
    }
}

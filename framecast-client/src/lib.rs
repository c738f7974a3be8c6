//! Framecast HTTP Client
//!
//! A type-safe HTTP client for the Framecast orchestrator API, shared by the
//! CLI (submission and status) and the runner (leasing and reporting).
//!
//! # Example
//!
//! ```no_run
//! use framecast_client::OrchestratorClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let submitted = client.submit_file("cat.png").await?;
//!     println!("Submitted job: {}", submitted.task_id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod worker;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use jobs::ResultDownload;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Framecast orchestrator API
///
/// Methods are organized into two groups:
/// - Client endpoints (submit, status, result download, health, metrics)
/// - Worker endpoints (lease, renew, complete, fail, release)
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Client with reqwest defaults
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Client over a preconfigured `reqwest::Client`
    ///
    /// A request timeout set here surfaces as an unavailable
    /// `ClientError::RequestFailed`.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decodes a 2xx JSON body, or turns anything else into `ApiError`
    async fn read_json<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Builds an `ApiError`, preferring the `error` field of a JSON body
    async fn api_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(text);

        ClientError::api_error(status, message)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/health"), "http://localhost:8080/health");
    }

    #[tokio::test]
    async fn test_unreachable_orchestrator_is_unavailable() {
        let http = Client::builder()
            .timeout(std::time::Duration::from_millis(500))
            .build()
            .unwrap();
        // Port 9 (discard) is closed on test hosts
        let client = OrchestratorClient::with_client("http://127.0.0.1:9", http);
        let err = client.health().await.unwrap_err();
        assert!(err.is_unavailable());
    }
}

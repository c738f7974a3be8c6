//! Runner configuration
//!
//! Defines all configurable parameters for the worker: orchestrator
//! connection, lease timing, the model backend and the generation parameters
//! applied to every job.

use framecast_core::domain::params::GenerationParams;
use framecast_core::queue::MAX_LEASE;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which `VideoModel` implementation the worker loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    /// Built-in deterministic motion model
    Motion,
    /// External inference command
    Process,
}

impl FromStr for ModelBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "motion" => Ok(ModelBackend::Motion),
            "process" => Ok(ModelBackend::Process),
            other => Err(format!("unknown model backend '{}'", other)),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this worker instance
    pub worker_id: String,

    /// Orchestrator base URL (e.g., "http://localhost:8080")
    pub orchestrator_url: String,

    /// How long to wait before polling again when the queue is empty
    pub poll_interval: Duration,

    /// Lease requested for each job; renewed while the job runs
    pub lease_duration: Duration,

    pub model_backend: ModelBackend,

    /// Inference executable for the `process` backend
    pub model_command: Option<PathBuf>,

    /// Model weights handed to the inference executable
    pub model_path: Option<PathBuf>,

    pub params: GenerationParams,

    /// ffmpeg binary used for mp4 output
    pub ffmpeg_path: PathBuf,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(worker_id: String, orchestrator_url: String) -> Self {
        Self {
            worker_id,
            orchestrator_url,
            poll_interval: Duration::from_secs(2),
            lease_duration: Duration::from_secs(300),
            model_backend: ModelBackend::Motion,
            model_command: None,
            model_path: None,
            params: GenerationParams::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - WORKER_ID (optional, default: random)
    /// - ORCHESTRATOR_URL (optional, default: http://localhost:8080)
    /// - POLL_INTERVAL (optional, seconds, default: 2)
    /// - LEASE_DURATION (optional, seconds, default: 300)
    /// - MODEL_BACKEND (optional, motion | process, default: motion)
    /// - MODEL_COMMAND / MODEL_PATH (required for the process backend)
    /// - VIDEO_WIDTH, VIDEO_HEIGHT, VIDEO_FRAMES, VIDEO_FPS (default: 1024, 576, 25, 7)
    /// - DECODE_CHUNK_SIZE (default: 8), MOTION_STRENGTH (default: 0.15)
    /// - FFMPEG_PATH (default: ffmpeg)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let params = GenerationParams::default();

        Ok(Self {
            worker_id: env_or("WORKER_ID", defaults.worker_id)?,
            orchestrator_url: env_or("ORCHESTRATOR_URL", defaults.orchestrator_url)?,
            poll_interval: Duration::from_secs(env_or("POLL_INTERVAL", 2)?),
            lease_duration: Duration::from_secs(env_or("LEASE_DURATION", 300)?),
            model_backend: env_or("MODEL_BACKEND", defaults.model_backend)?,
            model_command: std::env::var("MODEL_COMMAND").ok().map(PathBuf::from),
            model_path: std::env::var("MODEL_PATH").ok().map(PathBuf::from),
            params: GenerationParams {
                width: env_or("VIDEO_WIDTH", params.width)?,
                height: env_or("VIDEO_HEIGHT", params.height)?,
                frames: env_or("VIDEO_FRAMES", params.frames)?,
                fps: env_or("VIDEO_FPS", params.fps)?,
                decode_chunk_size: env_or("DECODE_CHUNK_SIZE", params.decode_chunk_size)?,
                motion_strength: env_or("MOTION_STRENGTH", params.motion_strength)?,
            },
            ffmpeg_path: env_or("FFMPEG_PATH", defaults.ffmpeg_path)?,
        })
    }

    /// Interval between lease renewals while a job runs
    pub fn renew_interval(&self) -> Duration {
        self.lease_duration / 3
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            anyhow::bail!("worker_id cannot be empty");
        }

        if self.orchestrator_url.is_empty() {
            anyhow::bail!("orchestrator_url cannot be empty");
        }

        if !self.orchestrator_url.starts_with("http://")
            && !self.orchestrator_url.starts_with("https://")
        {
            anyhow::bail!("orchestrator_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.lease_duration < Duration::from_secs(3) {
            anyhow::bail!("lease_duration must be at least 3 seconds");
        }

        // The orchestrator grants no more than this
        if self.lease_duration > MAX_LEASE {
            anyhow::bail!(
                "lease_duration must be at most {} seconds",
                MAX_LEASE.as_secs()
            );
        }

        if self.model_backend == ModelBackend::Process
            && (self.model_command.is_none() || self.model_path.is_none())
        {
            anyhow::bail!("MODEL_COMMAND and MODEL_PATH are required for the process backend");
        }

        self.params
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid generation parameters: {}", e))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            format!("worker-{}", uuid::Uuid::new_v4().simple()),
            "http://localhost:8080".to_string(),
        )
    }
}

/// Reads `key`, falling back to `default` when unset; a malformed value is an error
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        _ => Ok(default),
    }
}

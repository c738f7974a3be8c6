//! Orchestrator configuration
//!
//! Loaded once at startup from environment variables (a `.env` file is
//! honoured) and passed explicitly to every component.

use anyhow::Context;
use framecast_core::domain::artifact::VideoFormat;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Postgres connection string; `None` selects the in-memory queue
    pub database_url: Option<String>,

    /// Where uploaded images are stored until their job succeeds
    pub upload_dir: PathBuf,

    /// Where generated videos are written
    pub results_dir: PathBuf,

    /// Container format requested for every job
    pub video_format: VideoFormat,

    /// Retry budget given to each new job
    pub max_retries: u32,

    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,

    /// Age after which terminal jobs and their artifacts are purged
    pub retention: Option<Duration>,

    /// How often expired leases are reclaimed and the retention purge runs
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            upload_dir: PathBuf::from("data/uploads"),
            results_dir: PathBuf::from("data/results"),
            video_format: VideoFormat::Mp4,
            max_retries: 3,
            max_upload_bytes: 20 * 1024 * 1024,
            retention: Some(Duration::from_secs(168 * 3600)),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognised variables:
    /// - DATABASE_URL (optional; unset selects the in-memory queue)
    /// - ORCHESTRATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - UPLOAD_DIR / RESULTS_DIR (default: data/uploads, data/results)
    /// - VIDEO_FORMAT (mp4 | gif, default: mp4)
    /// - MAX_RETRIES (default: 3)
    /// - MAX_UPLOAD_BYTES (default: 20 MiB)
    /// - RETENTION_HOURS (default: 168, 0 disables purging)
    /// - LEASE_SWEEP_SECS (default: 60)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let retention = retention_from_hours(env_or("RETENTION_HOURS", 168)?)?;

        let config = Self {
            bind_addr: env_or("ORCHESTRATOR_BIND_ADDR", defaults.bind_addr)?,
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            upload_dir: env_or("UPLOAD_DIR", defaults.upload_dir)?,
            results_dir: env_or("RESULTS_DIR", defaults.results_dir)?,
            video_format: env_or("VIDEO_FORMAT", defaults.video_format)?,
            max_retries: env_or("MAX_RETRIES", defaults.max_retries)?,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            retention,
            sweep_interval: Duration::from_secs(env_or("LEASE_SWEEP_SECS", 60)?),
        };

        config.absolutize()
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.upload_dir == self.results_dir {
            anyhow::bail!("upload_dir and results_dir must differ");
        }

        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than 0");
        }

        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep_interval must be greater than 0");
        }

        Ok(())
    }

    /// Stored locators are absolute so workers on the same filesystem resolve them
    fn absolutize(mut self) -> anyhow::Result<Self> {
        self.upload_dir = std::path::absolute(&self.upload_dir)
            .with_context(|| format!("Invalid UPLOAD_DIR {}", self.upload_dir.display()))?;
        self.results_dir = std::path::absolute(&self.results_dir)
            .with_context(|| format!("Invalid RESULTS_DIR {}", self.results_dir.display()))?;
        Ok(self)
    }
}

/// `None` disables purging
fn retention_from_hours(hours: u64) -> anyhow::Result<Option<Duration>> {
    if hours == 0 {
        return Ok(None);
    }
    let Some(secs) = hours.checked_mul(3600) else {
        anyhow::bail!("RETENTION_HOURS is too large: {}", hours);
    };
    Ok(Some(Duration::from_secs(secs)))
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

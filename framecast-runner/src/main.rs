//! Framecast Runner
//!
//! A resource-bound worker that turns still images into short videos.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Model: the expensive resource, loaded once and released on exit
//! - Pipeline: per-job normalize, generate and encode steps
//! - Encoder: mp4 through ffmpeg, animated GIF in-process
//! - Repositories: HTTP communication with the orchestrator's queue
//! - Scheduler: lease, execute and report, one job at a time
//!
//! The first SIGINT/SIGTERM stops leasing and lets the in-flight job finish.
//! A second one interrupts it and hands it back to the queue.

mod config;
mod encoder;
mod model;
mod pipeline;
mod repository;
mod scheduler;

use anyhow::{Context, Result};
use framecast_client::OrchestratorClient;
use framecast_core::metrics::{self, JobMetrics};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::encoder::FfmpegEncoder;
use crate::repository::{HttpJobRepository, JobRepository};
use crate::scheduler::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "framecast_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Framecast Runner");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    info!(
        "Loaded configuration: worker_id={}, orchestrator_url={}, backend={:?}",
        config.worker_id, config.orchestrator_url, config.model_backend
    );
    info!(
        "Generation parameters: {}x{}, {} frames at {} fps, decode chunk {}, motion {}",
        config.params.width,
        config.params.height,
        config.params.frames,
        config.params.fps,
        config.params.decode_chunk_size,
        config.params.motion_strength
    );

    // mp4 output needs ffmpeg; gif output does not, so a missing binary only warns
    match FfmpegEncoder::new(config.ffmpeg_path.clone()).probe().await {
        Ok(version) => info!("Using {}", version),
        Err(e) => warn!("ffmpeg unavailable, mp4 jobs will fail: {}", e),
    }

    metrics::describe();
    let job_metrics = JobMetrics::new();

    let client = OrchestratorClient::new(config.orchestrator_url.clone());
    let repo: Arc<dyn JobRepository> =
        Arc::new(HttpJobRepository::new(client, config.worker_id.clone()));
    let loader = model::loader_for(&config)?;

    let shutdown = CancellationToken::new();
    let abort = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone(), abort.clone()));

    let worker = Worker::new(config, repo, job_metrics.clone());
    let result = worker.run(loader.as_ref(), shutdown, abort).await;

    let snapshot = job_metrics.snapshot();
    info!(
        completed = snapshot.jobs_completed,
        failed = snapshot.jobs_failed,
        "Runner stopped"
    );

    result
}

/// First signal requests a graceful stop, the second interrupts the running job
async fn watch_signals(shutdown: CancellationToken, abort: CancellationToken) {
    shutdown_signal().await;
    info!("Shutdown requested, finishing in-flight job (signal again to interrupt)");
    shutdown.cancel();

    shutdown_signal().await;
    warn!("Interrupting in-flight job");
    abort.cancel();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

//! Resource-bound worker
//!
//! Loads the model once, then leases and executes jobs strictly one at a
//! time. The model is handed to each execution by `&mut` reference and
//! released on every exit path.
//!
//! Shutdown uses two tokens. `shutdown` stops leasing; the in-flight job
//! still finishes and is reported. `abort` interrupts the in-flight job,
//! which is released back to the queue without consuming a retry.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use framecast_core::domain::job::{JobRecord, JobStatus};
use framecast_core::metrics::JobMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Backoff;
use crate::config::Config;
use crate::encoder::FfmpegEncoder;
use crate::model::{ModelLoader, VideoModel};
use crate::pipeline::{self, Pipeline};
use crate::repository::{JobRepository, RepositoryError};

/// Attempts made to deliver a report before leaving the job to lease expiry
const REPORT_ATTEMPTS: u32 = 5;

const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(100);

pub struct Worker {
    config: Config,
    repo: Arc<dyn JobRepository>,
    pipeline: Pipeline,
    metrics: JobMetrics,
}

impl Worker {
    pub fn new(config: Config, repo: Arc<dyn JobRepository>, metrics: JobMetrics) -> Self {
        let pipeline = Pipeline::new(
            config.params.clone(),
            FfmpegEncoder::new(config.ffmpeg_path.clone()),
        );
        Self {
            config,
            repo,
            pipeline,
            metrics,
        }
    }

    /// Runs the worker until `shutdown` or `abort` fires
    ///
    /// A model load failure is returned before anything is leased.
    pub async fn run(
        &self,
        loader: &dyn ModelLoader,
        shutdown: CancellationToken,
        abort: CancellationToken,
    ) -> Result<()> {
        let mut model = loader.load().await.context("Failed to load model")?;
        info!(
            worker_id = %self.config.worker_id,
            model = model.name(),
            "Model loaded, starting job loop (poll interval: {:?})",
            self.config.poll_interval
        );

        self.job_loop(model.as_mut(), &shutdown, &abort).await;

        model.release().await;
        info!(worker_id = %self.config.worker_id, "Model released");
        Ok(())
    }

    async fn job_loop(
        &self,
        model: &mut dyn VideoModel,
        shutdown: &CancellationToken,
        abort: &CancellationToken,
    ) {
        let mut backoff = Backoff::default();

        while !shutdown.is_cancelled() && !abort.is_cancelled() {
            let delay = match self.process_next(&mut *model, abort).await {
                Ok(true) => {
                    backoff.reset();
                    continue;
                }
                Ok(false) => {
                    backoff.reset();
                    debug!("No jobs available");
                    self.config.poll_interval
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, "Failed to lease a job, retrying in {:?}", delay);
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {}
                _ = abort.cancelled() => {}
            }
        }

        info!("Stopped leasing jobs");
    }

    /// Leases and executes one job
    ///
    /// Returns `Ok(false)` when the queue is empty. Errors are lease failures
    /// only; problems after the lease are reported to the queue or logged.
    pub async fn process_next(
        &self,
        model: &mut dyn VideoModel,
        abort: &CancellationToken,
    ) -> Result<bool, RepositoryError> {
        let Some(job) = self.repo.lease(self.config.lease_duration).await? else {
            return Ok(false);
        };

        info!(
            job_id = %job.id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "Leased job"
        );

        let timer = self.metrics.start_execution();
        let heartbeat = self.spawn_heartbeat(&job);

        let outcome = tokio::select! {
            result = self.pipeline.run(model, &job) => Some(result),
            _ = abort.cancelled() => None,
        };
        heartbeat.abort();

        match outcome {
            Some(Ok(output)) => {
                let elapsed = timer.succeeded();
                info!(job_id = %job.id, "Job succeeded in {:?}", elapsed);
                let recorded = self
                    .report(job.id, "complete", || self.repo.complete(job.id, output.clone()))
                    .await;
                // An unrecorded success goes back to the queue and needs its input again
                if recorded.is_some() {
                    pipeline::remove_input(&job).await;
                }
            }
            Some(Err(e)) => {
                let elapsed = timer.failed();
                warn!(
                    job_id = %job.id,
                    kind = ?e.kind,
                    error = %e,
                    "Job attempt failed after {:?}",
                    elapsed
                );
                let failure = e.into_failure();
                if let Some(record) = self
                    .report(job.id, "fail", || self.repo.fail(job.id, failure.clone()))
                    .await
                {
                    log_failure_outcome(&record);
                }
            }
            None => {
                timer.failed();
                warn!(job_id = %job.id, "Execution interrupted, releasing job");
                self.report(job.id, "release", || self.repo.release(job.id))
                    .await;
            }
        }

        Ok(true)
    }

    /// Renews the lease on `job` until aborted
    fn spawn_heartbeat(&self, job: &JobRecord) -> JoinHandle<()> {
        let repo = Arc::clone(&self.repo);
        let job_id = job.id;
        let lease_for = self.config.lease_duration;
        let every = renew_every(job, self.config.renew_interval(), Utc::now());
        debug!(job_id = %job_id, "Renewing lease every {:?}", every);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                match repo.renew(job_id, lease_for).await {
                    Ok(()) => debug!(job_id = %job_id, "Lease renewed"),
                    Err(e) => warn!(job_id = %job_id, error = %e, "Failed to renew lease"),
                }
            }
        })
    }

    /// Delivers a report, retrying while the queue is unreachable
    async fn report<T, F, Fut>(&self, job_id: Uuid, action: &'static str, mut op: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let mut backoff = Backoff::default();
        loop {
            match op().await {
                Ok(value) => return Some(value),
                Err(e) if e.is_unavailable() && backoff.attempts() + 1 < REPORT_ATTEMPTS => {
                    let delay = backoff.next_delay();
                    warn!(job_id = %job_id, action, error = %e, "Queue unreachable, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(job_id = %job_id, action, error = %e, "Failed to report job");
                    return None;
                }
            }
        }
    }
}

/// Renewal cadence for a leased job
///
/// The queue may grant less than was asked for, so a third of the lease
/// actually granted wins over the configured interval when it is shorter.
fn renew_every(job: &JobRecord, configured: Duration, now: DateTime<Utc>) -> Duration {
    let granted = job
        .lease_expires_at
        .and_then(|at| (at - now).to_std().ok())
        .map(|left| left / 3);

    match granted {
        Some(granted) => granted.min(configured),
        None => configured,
    }
    .max(MIN_RENEW_INTERVAL)
}

fn log_failure_outcome(record: &JobRecord) {
    match record.status {
        JobStatus::Queued => info!(
            job_id = %record.id,
            retry_count = record.retry_count,
            "Job re-queued for retry"
        ),
        _ => warn!(
            job_id = %record.id,
            retry_count = record.retry_count,
            error = record.error.as_deref().unwrap_or_default(),
            "Job failed permanently"
        ),
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.config.worker_id)
            .field("lease_duration", &self.config.lease_duration)
            .field("params", self.pipeline.params())
            .finish()
    }
}

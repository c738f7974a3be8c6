//! Background sweeper
//!
//! Runs on a fixed interval until cancelled. Each pass reclaims running jobs
//! whose lease expired (a crashed or partitioned worker) and, when retention
//! is enabled, purges terminal jobs older than the retention period together
//! with their artifacts.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Run the sweep loop until `cancel` is triggered
pub async fn run(state: AppState, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = state.config.sweep_interval.as_secs(),
        retention_hours = state.config.retention.map(|r| r.as_secs() / 3600),
        "Sweeper started"
    );

    let mut interval = tokio::time::interval(state.config.sweep_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Sweeper stopping");
                break;
            }
            _ = interval.tick() => sweep(&state).await,
        }
    }
}

/// One reclaim and purge pass
pub async fn sweep(state: &AppState) {
    let now = Utc::now();

    match state.queue.reclaim_expired(now).await {
        Ok(reclaimed) => {
            for job in &reclaimed {
                state.executions.finish(job.id, false);
                tracing::warn!(
                    job_id = %job.id,
                    status = %job.status,
                    retry_count = job.retry_count,
                    "Reclaimed job with expired lease"
                );
            }
        }
        Err(e) => tracing::error!(error = %e, "Lease reclaim failed"),
    }

    let Some(retention) = state.config.retention else {
        return;
    };

    let Some(cutoff) = purge_cutoff(now, retention) else {
        tracing::warn!(
            retention_secs = retention.as_secs(),
            "Retention period reaches past the earliest date, skipping purge"
        );
        return;
    };

    match state.queue.purge_terminal(cutoff).await {
        Ok(purged) if purged.is_empty() => {
            tracing::debug!("Retention: no jobs to purge");
        }
        Ok(purged) => {
            for job in &purged {
                state.store.remove_job_artifacts(job).await;
            }
            tracing::info!(purged = purged.len(), "Retention: purged expired jobs");
        }
        Err(e) => tracing::error!(error = %e, "Retention purge failed"),
    }
}

/// Completion time before which terminal jobs are purged
fn purge_cutoff(now: DateTime<Utc>, retention: Duration) -> Option<DateTime<Utc>> {
    let retention = chrono::Duration::from_std(retention).ok()?;
    now.checked_sub_signed(retention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use framecast_core::domain::job::{JobFailure, JobStatus};
    use framecast_core::queue::{JobQueue, MemoryQueue, NewJob};
    use std::path::Path;
    use std::sync::Arc;
    use uuid::Uuid;

    fn state(dir: &Path, retention: Option<Duration>) -> AppState {
        let config = Config {
            upload_dir: dir.join("uploads"),
            results_dir: dir.join("results"),
            retention,
            ..Config::default()
        };
        AppState::new(Arc::new(MemoryQueue::new()), config)
    }

    async fn enqueue(state: &AppState, dir: &Path) -> Uuid {
        let id = Uuid::new_v4();
        let artifacts = state.store.artifacts_for(id, Some("in.png"));
        tokio::fs::write(&artifacts.input, b"img").await.unwrap();
        state
            .queue
            .enqueue(NewJob {
                id,
                input_ref: artifacts.input.to_string_lossy().into_owned(),
                output_ref: dir.join("results").join(format!("{id}.mp4")).to_string_lossy().into_owned(),
                original_filename: Some("in.png".to_string()),
                max_retries: 1,
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_sweep_reclaims_expired_leases() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None);
        state.store.ensure_dirs().await.unwrap();
        let id = enqueue(&state, dir.path()).await;

        state.queue.lease("w1", Duration::ZERO).await.unwrap();
        sweep(&state).await;

        let job = state.queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert!(job.worker_id.is_none());
    }

    #[tokio::test]
    async fn test_sweep_purges_old_terminal_jobs_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Some(Duration::ZERO));
        state.store.ensure_dirs().await.unwrap();
        let id = enqueue(&state, dir.path()).await;
        let input = state.queue.get(id).await.unwrap().unwrap().input_ref;

        state.queue.lease("w1", Duration::from_secs(60)).await.unwrap();
        state
            .queue
            .fail(id, "w1", JobFailure::invalid_input("bad image"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        sweep(&state).await;

        assert!(state.queue.get(id).await.unwrap().is_none());
        assert!(!Path::new(&input).exists());
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_jobs_when_retention_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None);
        state.store.ensure_dirs().await.unwrap();
        let id = enqueue(&state, dir.path()).await;

        sweep(&state).await;

        let job = state.queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn test_purge_cutoff() {
        let now = Utc::now();
        assert_eq!(
            purge_cutoff(now, Duration::from_secs(3600)),
            Some(now - chrono::Duration::hours(1))
        );
        // Beyond chrono's range
        assert_eq!(purge_cutoff(now, Duration::MAX), None);
        // In range, but further back than the earliest representable date
        assert_eq!(purge_cutoff(now, Duration::from_secs(10_000_000_000_000)), None);
    }

    #[tokio::test]
    async fn test_sweep_survives_huge_retention() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Some(Duration::from_secs(10_000_000_000_000)));
        state.store.ensure_dirs().await.unwrap();
        let id = enqueue(&state, dir.path()).await;

        state.queue.lease("w1", Duration::ZERO).await.unwrap();
        sweep(&state).await;

        // Reclaim still ran
        let job = state.queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(state, cancel.clone()));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

//! Job lifecycle metrics
//!
//! Every update is emitted through the `metrics` facade, so whichever
//! recorder the process installs receives it, and is mirrored in local
//! atomics that back the JSON snapshot served by `/metrics`.
//!
//! Update points:
//! - `jobs_created`: a submission was accepted
//! - `jobs_in_progress`: +1 at start of execution, -1 at its end
//! - `jobs_completed` / `jobs_failed` and `job_duration_seconds`: end of execution

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const JOBS_CREATED: &str = "jobs_created";
pub const JOBS_COMPLETED: &str = "jobs_completed";
pub const JOBS_FAILED: &str = "jobs_failed";
pub const JOBS_IN_PROGRESS: &str = "jobs_in_progress";
pub const JOB_DURATION_SECONDS: &str = "job_duration_seconds";

/// Registers metric descriptions with the installed recorder
pub fn describe() {
    describe_counter!(JOBS_CREATED, "Number of video generation jobs created.");
    describe_counter!(JOBS_COMPLETED, "Number of completed jobs.");
    describe_counter!(JOBS_FAILED, "Number of failed job attempts.");
    describe_gauge!(JOBS_IN_PROGRESS, "Jobs currently running.");
    describe_histogram!(JOB_DURATION_SECONDS, "Duration of video jobs (s).");
}

/// Point-in-time copy of the local counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_in_progress: i64,
    pub job_duration_count: u64,
    pub job_duration_sum_seconds: f64,
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_progress: AtomicI64,
    duration_count: AtomicU64,
    duration_sum_micros: AtomicU64,
}

/// Metrics sink shared by the components of one process
#[derive(Clone, Default)]
pub struct JobMetrics {
    counters: Arc<Counters>,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_created(&self) {
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        counter!(JOBS_CREATED).increment(1);
    }

    /// Marks the start of an execution
    ///
    /// The returned guard must be finished with `succeeded` or `failed`; if it
    /// is dropped unfinished the execution counts as failed, so the in-progress
    /// gauge always returns to its previous value.
    pub fn start_execution(&self) -> ExecutionTimer {
        self.counters.in_progress.fetch_add(1, Ordering::Relaxed);
        gauge!(JOBS_IN_PROGRESS).increment(1.0);
        ExecutionTimer {
            metrics: self.clone(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            jobs_created: c.created.load(Ordering::Relaxed),
            jobs_completed: c.completed.load(Ordering::Relaxed),
            jobs_failed: c.failed.load(Ordering::Relaxed),
            jobs_in_progress: c.in_progress.load(Ordering::Relaxed),
            job_duration_count: c.duration_count.load(Ordering::Relaxed),
            job_duration_sum_seconds: c.duration_sum_micros.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
        }
    }

    fn finish_execution(&self, succeeded: bool, elapsed: Duration) {
        let c = &self.counters;
        if succeeded {
            c.completed.fetch_add(1, Ordering::Relaxed);
            counter!(JOBS_COMPLETED).increment(1);
        } else {
            c.failed.fetch_add(1, Ordering::Relaxed);
            counter!(JOBS_FAILED).increment(1);
        }

        c.in_progress.fetch_sub(1, Ordering::Relaxed);
        gauge!(JOBS_IN_PROGRESS).decrement(1.0);

        c.duration_count.fetch_add(1, Ordering::Relaxed);
        c.duration_sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        histogram!(JOB_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }
}

/// In-flight execution; see [`JobMetrics::start_execution`]
pub struct ExecutionTimer {
    metrics: JobMetrics,
    started: Instant,
    finished: bool,
}

impl ExecutionTimer {
    pub fn succeeded(mut self) -> Duration {
        self.finish(true)
    }

    pub fn failed(mut self) -> Duration {
        self.finish(false)
    }

    fn finish(&mut self, succeeded: bool) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.finished {
            self.finished = true;
            self.metrics.finish_execution(succeeded, elapsed);
        }
        elapsed
    }
}

impl Drop for ExecutionTimer {
    fn drop(&mut self) {
        self.finish(false);
    }
}

/// Executions keyed by job id, for a process that observes starts and ends
/// as separate events (lease, then complete or fail)
#[derive(Clone, Default)]
pub struct ExecutionTracker {
    metrics: JobMetrics,
    running: Arc<Mutex<HashMap<Uuid, ExecutionTimer>>>,
}

impl ExecutionTracker {
    pub fn new(metrics: JobMetrics) -> Self {
        Self {
            metrics,
            running: Arc::default(),
        }
    }

    /// Starts timing `id`; a previous unfinished execution of it counts as failed
    pub fn begin(&self, id: Uuid) {
        let timer = self.metrics.start_execution();
        self.running().insert(id, timer);
    }

    /// Ends the execution of `id`, if one is being tracked
    pub fn finish(&self, id: Uuid, succeeded: bool) -> Option<Duration> {
        let timer = self.running().remove(&id)?;
        Some(if succeeded {
            timer.succeeded()
        } else {
            timer.failed()
        })
    }

    fn running(&self) -> MutexGuard<'_, HashMap<Uuid, ExecutionTimer>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_counter() {
        let metrics = JobMetrics::new();
        metrics.job_created();
        metrics.job_created();
        assert_eq!(metrics.snapshot().jobs_created, 2);
    }

    #[test]
    fn test_in_progress_returns_to_baseline() {
        let metrics = JobMetrics::new();
        let baseline = metrics.snapshot().jobs_in_progress;

        let a = metrics.start_execution();
        let b = metrics.start_execution();
        let c = metrics.start_execution();
        assert_eq!(metrics.snapshot().jobs_in_progress, baseline + 3);

        a.succeeded();
        b.failed();
        drop(c);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_in_progress, baseline);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.jobs_failed, 2);
        assert_eq!(snapshot.job_duration_count, 3);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = JobMetrics::new();
        let clone = metrics.clone();
        clone.job_created();
        assert_eq!(metrics.snapshot().jobs_created, 1);
    }

    #[test]
    fn test_tracker_matches_starts_with_ends() {
        let metrics = JobMetrics::new();
        let tracker = ExecutionTracker::new(metrics.clone());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        tracker.begin(a);
        tracker.begin(b);
        assert_eq!(metrics.snapshot().jobs_in_progress, 2);

        assert!(tracker.finish(a, true).is_some());
        assert!(tracker.finish(a, true).is_none());
        tracker.finish(b, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_in_progress, 0);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.jobs_failed, 1);
    }
}

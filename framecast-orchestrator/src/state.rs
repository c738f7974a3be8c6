use framecast_core::metrics::{ExecutionTracker, JobMetrics};
use framecast_core::queue::JobQueue;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::config::Config;
use crate::storage::ArtifactStore;

/// Shared handles passed to every request handler and background task
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobQueue>,
    pub store: ArtifactStore,
    pub metrics: JobMetrics,
    pub executions: ExecutionTracker,
    pub config: Arc<Config>,
    /// Renders the installed facade recorder; absent when none is installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(queue: Arc<dyn JobQueue>, config: Config) -> Self {
        let store = ArtifactStore::new(
            config.upload_dir.clone(),
            config.results_dir.clone(),
            config.video_format,
        );

        let metrics = JobMetrics::new();

        Self {
            queue,
            store,
            executions: ExecutionTracker::new(metrics.clone()),
            metrics,
            config: Arc::new(config),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

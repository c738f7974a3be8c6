//! Artifact storage
//!
//! Uploaded images and generated videos live on a filesystem shared with the
//! workers. Job records only carry their absolute paths.

use framecast_core::domain::artifact::{VideoFormat, input_ref_for, output_ref_for};
use framecast_core::domain::job::JobRecord;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    upload_dir: PathBuf,
    results_dir: PathBuf,
    format: VideoFormat,
}

/// Locators reserved for a new job
#[derive(Debug, Clone)]
pub struct JobArtifacts {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ArtifactStore {
    pub fn new(upload_dir: PathBuf, results_dir: PathBuf, format: VideoFormat) -> Self {
        Self {
            upload_dir,
            results_dir,
            format,
        }
    }

    /// Creates both directories if they are missing
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.results_dir).await
    }

    pub fn artifacts_for(&self, id: Uuid, filename: Option<&str>) -> JobArtifacts {
        JobArtifacts {
            input: input_ref_for(&self.upload_dir, id, filename),
            output: output_ref_for(&self.results_dir, id, self.format),
        }
    }

    /// Persists upload bytes under `path`
    ///
    /// The bytes go to a sibling temp file first and are renamed into place,
    /// so a worker never observes a partially written input.
    pub async fn save_upload(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let tmp = path.with_extension("part");
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp, path).await
    }

    /// Size of the produced artifact, or `None` when it is missing or empty
    pub async fn artifact_size(&self, path: &Path) -> Option<u64> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
            _ => None,
        }
    }

    /// Deletes a single file, treating a missing file as already deleted
    pub async fn remove(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Deletes both artifacts of a purged job
    pub async fn remove_job_artifacts(&self, job: &JobRecord) {
        for path in [&job.input_ref, &job.output_ref] {
            if let Err(e) = self.remove(Path::new(path)).await {
                tracing::warn!(job_id = %job.id, path = %path, error = %e, "Failed to delete artifact");
            }
        }
    }
}

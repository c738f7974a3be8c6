//! Execution pipeline
//!
//! Runs one leased job against the worker's model:
//!
//! 1. Resolve the input artifact
//! 2. Normalize it to the configured resolution
//! 3. Generate frames with the model
//! 4. Encode them into the output locator (temporary sibling, then rename)
//!
//! Every failure is classified so the queue can decide between retry and
//! terminal failure. No partial output is left behind. The input stays in
//! place: it may only go once the queue has recorded the success, which is
//! the worker's call through [`remove_input`].

mod normalize;

pub use normalize::normalize;

use framecast_core::domain::artifact::VideoFormat;
use framecast_core::domain::job::{FailureKind, JobFailure, JobOutput, JobRecord};
use framecast_core::domain::params::GenerationParams;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::encoder::{FfmpegEncoder, GifEncoder, VideoEncoder};
use crate::model::{Frame, VideoModel};

/// Pipeline failure with its retry classification
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct PipelineError {
    pub kind: FailureKind,
    pub message: String,
}

impl PipelineError {
    fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    fn input_missing(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InputMissing,
            message: message.into(),
        }
    }

    fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            message: message.into(),
        }
    }

    /// What gets reported to the queue
    pub fn into_failure(self) -> JobFailure {
        JobFailure {
            kind: self.kind,
            message: self.message,
        }
    }
}

pub struct Pipeline {
    params: GenerationParams,
    ffmpeg: FfmpegEncoder,
    gif: GifEncoder,
}

impl Pipeline {
    pub fn new(params: GenerationParams, ffmpeg: FfmpegEncoder) -> Self {
        Self {
            params,
            ffmpeg,
            gif: GifEncoder,
        }
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    fn encoder_for(&self, format: VideoFormat) -> &dyn VideoEncoder {
        match format {
            VideoFormat::Mp4 => &self.ffmpeg,
            VideoFormat::Gif => &self.gif,
        }
    }

    /// Executes `job` with `model`
    pub async fn run(
        &self,
        model: &mut dyn VideoModel,
        job: &JobRecord,
    ) -> Result<JobOutput, PipelineError> {
        let started = Instant::now();
        let input = Path::new(&job.input_ref);
        let output = PathBuf::from(&job.output_ref);

        let format = VideoFormat::from_path(&output).ok_or_else(|| {
            PipelineError::invalid_input(format!("unsupported output locator {}", job.output_ref))
        })?;

        // 1. Resolve
        let bytes = match tokio::fs::read(input).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::input_missing(format!(
                    "input artifact {} does not exist",
                    job.input_ref
                )));
            }
            Err(e) => {
                return Err(PipelineError::transient(format!(
                    "failed to read input artifact: {}",
                    e
                )));
            }
        };

        // 2. Normalize
        let (width, height) = (self.params.width, self.params.height);
        let image = tokio::task::spawn_blocking(move || normalize(&bytes, width, height))
            .await
            .map_err(|e| PipelineError::transient(format!("normalization task failed: {}", e)))?
            .map_err(|e| PipelineError::invalid_input(format!("input is not a decodable image: {}", e)))?;
        debug!(job_id = %job.id, width, height, "Input normalized");

        // 3. Generate
        let frames = model
            .generate(&image, &self.params)
            .await
            .map_err(|e| PipelineError::transient(e.to_string()))?;
        check_frames(&frames, &self.params)?;
        let frame_count = frames.len() as u32;
        debug!(job_id = %job.id, model = model.name(), frame_count, "Frames generated");

        // 4. Encode
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::transient(format!("failed to create results directory: {}", e))
            })?;
        }
        let partial = partial_path(&output);
        let encoded = self
            .encoder_for(format)
            .encode(frames, self.params.fps, &partial)
            .await
            .map_err(|e| PipelineError::transient(format!("encoding failed: {}", e)));
        let committed = match encoded {
            Ok(()) => tokio::fs::rename(&partial, &output)
                .await
                .map_err(|e| PipelineError::transient(format!("failed to store video: {}", e))),
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            discard(&partial).await;
            return Err(e);
        }

        let size_bytes = match tokio::fs::metadata(&output).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                discard(&output).await;
                return Err(PipelineError::transient(format!(
                    "stored video is unreadable: {}",
                    e
                )));
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            job_id = %job.id,
            output = %job.output_ref,
            size_bytes,
            frame_count,
            elapsed_ms,
            "Video written"
        );

        Ok(JobOutput {
            output_ref: job.output_ref.clone(),
            size_bytes,
            frame_count,
            fps: self.params.fps,
            width,
            height,
            elapsed_ms,
        })
    }
}

/// The model must honour the configured frame count and resolution
fn check_frames(frames: &[Frame], params: &GenerationParams) -> Result<(), PipelineError> {
    if frames.len() != params.frames as usize {
        return Err(PipelineError::transient(format!(
            "model produced {} frames, expected {}",
            frames.len(),
            params.frames
        )));
    }
    let expected = (params.width, params.height);
    if let Some((index, frame)) = frames.iter().enumerate().find(|(_, f)| f.dimensions() != expected) {
        let (w, h) = frame.dimensions();
        return Err(PipelineError::transient(format!(
            "frame {} is {}x{}, expected {}x{}",
            index, w, h, expected.0, expected.1
        )));
    }
    Ok(())
}

/// Deletes the input of a job whose success the queue has recorded
///
/// A missing file counts as deleted.
pub async fn remove_input(job: &JobRecord) {
    match tokio::fs::remove_file(&job.input_ref).await {
        Ok(()) => debug!(job_id = %job.id, "Input artifact deleted"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(job_id = %job.id, error = %e, "Failed to delete input artifact"),
    }
}

/// `{output}.part` next to the final file, so the rename stays on one filesystem
fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{ScriptedLoader, Step};
    use crate::model::{MotionModelLoader, ModelLoader};
    use chrono::Utc;
    use image::AnimationDecoder;
    use image::codecs::gif::GifDecoder;
    use std::io::{BufReader, Cursor};
    use uuid::Uuid;

    fn params() -> GenerationParams {
        GenerationParams {
            width: 32,
            height: 16,
            frames: 6,
            fps: 6,
            decode_chunk_size: 4,
            motion_strength: 0.3,
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(params(), FfmpegEncoder::new("/nonexistent/ffmpeg"))
    }

    fn write_png(path: &Path) {
        let img = image::RgbImage::from_fn(48, 48, |x, y| image::Rgb([x as u8 * 5, y as u8 * 5, 90]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn job(dir: &Path, ext: &str) -> JobRecord {
        let id = Uuid::new_v4();
        JobRecord::new(
            id,
            dir.join(format!("{}_in.png", id)).display().to_string(),
            dir.join("results").join(format!("{}.{}", id, ext)).display().to_string(),
            Some("in.png".to_string()),
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_run_writes_gif_and_keeps_input() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "gif");
        write_png(Path::new(&job.input_ref));

        let mut model = MotionModelLoader.load().await.unwrap();
        let output = pipeline().run(model.as_mut(), &job).await.unwrap();

        assert_eq!(output.frame_count, 6);
        assert_eq!(output.fps, 6);
        assert_eq!((output.width, output.height), (32, 16));
        assert!(output.size_bytes > 0);
        assert!(Path::new(&job.input_ref).exists());
        assert!(!partial_path(Path::new(&job.output_ref)).exists());

        let file = std::fs::File::open(&job.output_ref).unwrap();
        let frames = GifDecoder::new(BufReader::new(file))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(frames.len(), 6);
    }

    #[tokio::test]
    async fn test_missing_input_is_not_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "gif");
        let (loader, probe) = ScriptedLoader::new(vec![]);
        let mut model = loader.load().await.unwrap();

        let err = pipeline().run(model.as_mut(), &job).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InputMissing);
        assert_eq!(probe.calls(), 0);
        assert!(!Path::new(&job.output_ref).exists());
    }

    #[tokio::test]
    async fn test_undecodable_input_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "gif");
        std::fs::write(&job.input_ref, b"not an image").unwrap();
        let (loader, _) = ScriptedLoader::new(vec![]);
        let mut model = loader.load().await.unwrap();

        let err = pipeline().run(model.as_mut(), &job).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidInput);
        assert_eq!(err.clone().into_failure().kind, FailureKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_model_failure_is_transient_and_keeps_input() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "gif");
        write_png(Path::new(&job.input_ref));
        let (loader, _) = ScriptedLoader::new(vec![Step::Fail("CUDA out of memory")]);
        let mut model = loader.load().await.unwrap();

        let err = pipeline().run(model.as_mut(), &job).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
        assert!(err.message.contains("CUDA out of memory"));
        assert!(Path::new(&job.input_ref).exists());
        assert!(!Path::new(&job.output_ref).exists());
    }

    #[tokio::test]
    async fn test_encoder_failure_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "mp4");
        write_png(Path::new(&job.input_ref));
        let (loader, _) = ScriptedLoader::new(vec![]);
        let mut model = loader.load().await.unwrap();

        let err = pipeline().run(model.as_mut(), &job).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
        assert!(!Path::new(&job.output_ref).exists());
        assert!(!partial_path(Path::new(&job.output_ref)).exists());
        assert!(Path::new(&job.input_ref).exists());
    }

    #[tokio::test]
    async fn test_short_clip_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "gif");
        write_png(Path::new(&job.input_ref));
        let (loader, _) = ScriptedLoader::new(vec![Step::Count(1)]);
        let mut model = loader.load().await.unwrap();

        let err = pipeline().run(model.as_mut(), &job).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
        assert!(err.message.contains("1 frames, expected 6"));
        assert!(!Path::new(&job.output_ref).exists());
        assert!(Path::new(&job.input_ref).exists());
    }

    #[tokio::test]
    async fn test_wrong_frame_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "gif");
        write_png(Path::new(&job.input_ref));
        let (loader, _) = ScriptedLoader::new(vec![Step::Size(64, 64)]);
        let mut model = loader.load().await.unwrap();

        let err = pipeline().run(model.as_mut(), &job).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
        assert!(err.message.contains("64x64, expected 32x16"));
        assert!(!Path::new(&job.output_ref).exists());
    }

    #[tokio::test]
    async fn test_remove_input_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "gif");
        write_png(Path::new(&job.input_ref));

        remove_input(&job).await;
        assert!(!Path::new(&job.input_ref).exists());
        remove_input(&job).await;
    }

    #[tokio::test]
    async fn test_unknown_output_format_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "avi");
        write_png(Path::new(&job.input_ref));
        let (loader, probe) = ScriptedLoader::new(vec![]);
        let mut model = loader.load().await.unwrap();

        let err = pipeline().run(model.as_mut(), &job).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidInput);
        assert_eq!(probe.calls(), 0);
    }
}

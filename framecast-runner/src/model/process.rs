//! External inference process
//!
//! Delegates generation to an executable, typically a wrapper around a
//! diffusion pipeline on a GPU host. The executable is validated once at
//! load time and invoked per job as:
//!
//! ```text
//! <command> --model <model_path> --input <png> --output-dir <dir>
//!           --width W --height H --frames N --decode-chunk-size C
//!           --motion-strength M
//! ```
//!
//! It must write `frame_00000.png`, `frame_00001.png`, ... into the output
//! directory and exit with status 0.

use async_trait::async_trait;
use framecast_core::domain::params::GenerationParams;
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::{Frame, ModelError, ModelLoader, VideoModel};

/// Trailing stderr kept in error messages
const STDERR_TAIL: usize = 2000;

pub struct ProcessModelLoader {
    command: PathBuf,
    model_path: PathBuf,
}

impl ProcessModelLoader {
    pub fn new(command: PathBuf, model_path: PathBuf) -> Self {
        Self {
            command,
            model_path,
        }
    }
}

#[async_trait]
impl ModelLoader for ProcessModelLoader {
    async fn load(&self) -> Result<Box<dyn VideoModel>, ModelError> {
        let metadata = tokio::fs::metadata(&self.command).await.map_err(|e| {
            ModelError::Load(format!(
                "inference command {} not found: {}",
                self.command.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                return Err(ModelError::Load(format!(
                    "{} is not executable (mode {:#o})",
                    self.command.display(),
                    mode
                )));
            }
        }
        #[cfg(not(unix))]
        let _ = metadata;

        if !tokio::fs::try_exists(&self.model_path).await? {
            return Err(ModelError::Load(format!(
                "model path {} does not exist",
                self.model_path.display()
            )));
        }

        tracing::info!(
            command = %self.command.display(),
            model = %self.model_path.display(),
            "Inference process validated"
        );

        Ok(Box::new(ProcessModel {
            command: self.command.clone(),
            model_path: self.model_path.clone(),
        }))
    }
}

pub struct ProcessModel {
    command: PathBuf,
    model_path: PathBuf,
}

impl ProcessModel {
    async fn read_frames(dir: &Path) -> Result<Vec<Frame>, ModelError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("frame_") && name.ends_with(".png") {
                paths.push(entry.path());
            }
        }
        paths.sort();

        tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|path| {
                    image::open(path).map(|img| img.to_rgb8()).map_err(|e| {
                        ModelError::Inference(format!("unreadable frame {}: {}", path.display(), e))
                    })
                })
                .collect::<Result<Vec<Frame>, ModelError>>()
        })
        .await
        .map_err(|e| ModelError::Inference(format!("frame decoding task failed: {}", e)))?
    }
}

#[async_trait]
impl VideoModel for ProcessModel {
    fn name(&self) -> &str {
        "process"
    }

    async fn generate(
        &mut self,
        image: &RgbImage,
        params: &GenerationParams,
    ) -> Result<Vec<Frame>, ModelError> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("input.png");
        let frames_dir = workdir.path().join("frames");
        tokio::fs::create_dir(&frames_dir).await?;

        let source = image.clone();
        let input_path = input.clone();
        tokio::task::spawn_blocking(move || source.save(&input_path))
            .await
            .map_err(|e| ModelError::Inference(format!("input encoding task failed: {}", e)))?
            .map_err(|e| ModelError::Inference(format!("failed to write model input: {}", e)))?;

        let output = tokio::process::Command::new(&self.command)
            .arg("--model")
            .arg(&self.model_path)
            .arg("--input")
            .arg(&input)
            .arg("--output-dir")
            .arg(&frames_dir)
            .args([
                "--width",
                &params.width.to_string(),
                "--height",
                &params.height.to_string(),
                "--frames",
                &params.frames.to_string(),
                "--decode-chunk-size",
                &params.decode_chunk_size.to_string(),
                "--motion-strength",
                &params.motion_strength.to_string(),
            ])
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let start = (start..stderr.len())
                .find(|&i| stderr.is_char_boundary(i))
                .unwrap_or(stderr.len());
            let tail = &stderr[start..];
            return Err(ModelError::Inference(format!(
                "inference command exited with {}: {}",
                output.status,
                tail.trim()
            )));
        }

        let frames = Self::read_frames(&frames_dir).await?;
        if frames.is_empty() {
            return Err(ModelError::NoFrames);
        }

        Ok(frames)
    }

    async fn release(&mut self) {
        tracing::info!(command = %self.command.display(), "Releasing inference process model");
    }
}

//! H.264 mp4 output through the `ffmpeg` binary
//!
//! Frames are staged as numbered PNGs in a scratch directory and fed to
//! ffmpeg as an image sequence.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{EncodeError, VideoEncoder, check_frames};
use crate::model::Frame;

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Checks that the binary can be executed
    pub async fn probe(&self) -> Result<String, EncodeError> {
        let output = tokio::process::Command::new(&self.binary)
            .arg("-version")
            .output()
            .await
            .map_err(EncodeError::NotFound)?;

        if !output.status.success() {
            return Err(EncodeError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }
}

fn stage_frames(frames: Vec<Frame>, dir: &Path) -> Result<(), EncodeError> {
    for (i, frame) in frames.iter().enumerate() {
        frame.save(dir.join(format!("frame_{:05}.png", i)))?;
    }
    Ok(())
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, frames: Vec<Frame>, fps: u32, dest: &Path) -> Result<(), EncodeError> {
        check_frames(&frames)?;

        let staging = tempfile::tempdir()?;
        let staging_path = staging.path().to_path_buf();
        tokio::task::spawn_blocking(move || stage_frames(frames, &staging_path))
            .await
            .map_err(|e| EncodeError::Io(std::io::Error::other(e)))??;

        let output = tokio::process::Command::new(&self.binary)
            .args(["-y", "-loglevel", "error", "-framerate", &fps.max(1).to_string(), "-i"])
            .arg(staging.path().join("frame_%05d.png"))
            .args([
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                "-f",
                "mp4",
            ])
            .arg(dest)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(EncodeError::NotFound)?;

        if !output.status.success() {
            return Err(EncodeError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[tokio::test]
    async fn test_missing_binary() {
        let encoder = FfmpegEncoder::new("/nonexistent/ffmpeg");
        assert!(matches!(encoder.probe().await, Err(EncodeError::NotFound(_))));

        let dir = tempfile::tempdir().unwrap();
        let frames = vec![RgbImage::new(4, 4)];
        let result = encoder.encode(frames, 7, &dir.path().join("out.mp4")).await;
        assert!(matches!(result, Err(EncodeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_empty_sequence() {
        let encoder = FfmpegEncoder::new("ffmpeg");
        let dir = tempfile::tempdir().unwrap();
        let result = encoder.encode(Vec::new(), 7, &dir.path().join("out.mp4")).await;
        assert!(matches!(result, Err(EncodeError::NoFrames)));
    }
}

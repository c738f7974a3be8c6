//! Video encoders
//!
//! Turn a frame sequence into a container file. The container is chosen per
//! job from the output locator's extension.

mod ffmpeg;
mod gif;

pub use ffmpeg::FfmpegEncoder;
pub use gif::GifEncoder;

use async_trait::async_trait;
use std::path::Path;

use crate::model::Frame;

/// Encoder error type
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("no frames to encode")]
    NoFrames,

    #[error("frames have mismatched dimensions")]
    MismatchedFrames,

    #[error("encoder binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("encoder failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Writes `frames` played back at `fps` into `dest`
    async fn encode(&self, frames: Vec<Frame>, fps: u32, dest: &Path) -> Result<(), EncodeError>;
}

/// Checks the invariants every encoder relies on
fn check_frames(frames: &[Frame]) -> Result<(u32, u32), EncodeError> {
    let first = frames.first().ok_or(EncodeError::NoFrames)?;
    let dims = first.dimensions();
    if frames.iter().any(|f| f.dimensions() != dims) {
        return Err(EncodeError::MismatchedFrames);
    }
    Ok(dims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_check_frames() {
        assert!(matches!(check_frames(&[]), Err(EncodeError::NoFrames)));

        let frames = vec![RgbImage::new(4, 2), RgbImage::new(4, 2)];
        assert_eq!(check_frames(&frames).unwrap(), (4, 2));

        let frames = vec![RgbImage::new(4, 2), RgbImage::new(2, 4)];
        assert!(matches!(check_frames(&frames), Err(EncodeError::MismatchedFrames)));
    }
}

//! Animated GIF output, encoded in-process

use async_trait::async_trait;
use image::codecs::gif::{GifEncoder as ImageGifEncoder, Repeat};
use image::{Delay, DynamicImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::{EncodeError, VideoEncoder, check_frames};
use crate::model::Frame;

#[derive(Debug, Clone, Default)]
pub struct GifEncoder;

fn write_gif(frames: Vec<Frame>, fps: u32, dest: &Path) -> Result<(), EncodeError> {
    let delay = Delay::from_numer_denom_ms(1000, fps.max(1));
    let file = BufWriter::new(File::create(dest)?);

    let mut encoder = ImageGifEncoder::new_with_speed(file, 10);
    encoder.set_repeat(Repeat::Infinite)?;

    for frame in frames {
        let rgba = DynamicImage::ImageRgb8(frame).into_rgba8();
        encoder.encode_frame(image::Frame::from_parts(rgba, 0, 0, delay))?;
    }

    Ok(())
}

#[async_trait]
impl VideoEncoder for GifEncoder {
    async fn encode(&self, frames: Vec<Frame>, fps: u32, dest: &Path) -> Result<(), EncodeError> {
        check_frames(&frames)?;
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || write_gif(frames, fps, &dest))
            .await
            .map_err(|e| EncodeError::Io(std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::AnimationDecoder;
    use image::RgbImage;
    use image::codecs::gif::GifDecoder;
    use std::io::BufReader;

    #[tokio::test]
    async fn test_encodes_every_frame_at_fps() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.gif");
        let frames: Vec<Frame> = (0..5)
            .map(|i| RgbImage::from_pixel(16, 8, image::Rgb([i * 40, 0, 0])))
            .collect();

        GifEncoder.encode(frames, 5, &dest).await.unwrap();

        let decoder = GifDecoder::new(BufReader::new(File::open(&dest).unwrap())).unwrap();
        let decoded = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded[0].buffer().dimensions(), (16, 8));

        let (numer, denom) = decoded[0].delay().numer_denom_ms();
        assert_eq!(numer / denom, 200);
    }

    #[tokio::test]
    async fn test_rejects_empty_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let result = GifEncoder.encode(Vec::new(), 7, &dir.path().join("x.gif")).await;
        assert!(matches!(result, Err(EncodeError::NoFrames)));
        assert!(!dir.path().join("x.gif").exists());
    }
}

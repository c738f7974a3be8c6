//! Built-in motion model
//!
//! Produces a slow zoom with a horizontal pan across the source image. The
//! output depends only on the image and the parameters, which makes it useful
//! for development and end-to-end checks without inference hardware.

use async_trait::async_trait;
use framecast_core::domain::params::GenerationParams;
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::sync::Arc;

use super::{Frame, ModelError, ModelLoader, VideoModel};

pub struct MotionModelLoader;

#[async_trait]
impl ModelLoader for MotionModelLoader {
    async fn load(&self) -> Result<Box<dyn VideoModel>, ModelError> {
        tracing::info!("Loading built-in motion model");
        Ok(Box::new(MotionModel { generated: 0 }))
    }
}

pub struct MotionModel {
    generated: u64,
}

/// Renders frame `index` of `total`
fn render_frame(source: &RgbImage, index: u32, total: u32, strength: f32) -> Frame {
    let (w, h) = source.dimensions();
    let t = if total > 1 {
        index as f32 / (total - 1) as f32
    } else {
        0.0
    };

    // Zoom in by up to `strength` while panning left to right
    let scale = 1.0 + strength * t;
    let crop_w = ((w as f32 / scale).round() as u32).clamp(1, w);
    let crop_h = ((h as f32 / scale).round() as u32).clamp(1, h);
    let x = ((w - crop_w) as f32 * t).round() as u32;
    let y = (h - crop_h) / 2;

    let window = imageops::crop_imm(source, x, y, crop_w, crop_h).to_image();
    if window.dimensions() == (w, h) {
        window
    } else {
        imageops::resize(&window, w, h, FilterType::Triangle)
    }
}

#[async_trait]
impl VideoModel for MotionModel {
    fn name(&self) -> &str {
        "motion"
    }

    async fn generate(
        &mut self,
        image: &RgbImage,
        params: &GenerationParams,
    ) -> Result<Vec<Frame>, ModelError> {
        let source = Arc::new(image.clone());
        let total = params.frames;
        let chunk = params.decode_chunk_size.max(1);
        let strength = params.motion_strength;
        let mut frames = Vec::with_capacity(total as usize);

        // Frames are rendered in chunks on the blocking pool
        let mut start = 0;
        while start < total {
            let end = (start + chunk).min(total);
            let source = Arc::clone(&source);
            let rendered = tokio::task::spawn_blocking(move || {
                (start..end)
                    .map(|i| render_frame(&source, i, total, strength))
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|e| ModelError::Inference(format!("frame rendering task failed: {}", e)))?;

            frames.extend(rendered);
            start = end;
        }

        if frames.is_empty() {
            return Err(ModelError::NoFrames);
        }

        self.generated += 1;
        Ok(frames)
    }

    async fn release(&mut self) {
        tracing::info!(videos = self.generated, "Releasing motion model");
    }
}

//! Generation parameters
//!
//! Fixed per worker process and applied to every job it executes.

use serde::{Deserialize, Serialize};

/// Parameters passed to the model and the encoder for every job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Width the input image is resized to
    pub width: u32,
    /// Height the input image is resized to
    pub height: u32,
    /// Number of frames to generate
    pub frames: u32,
    /// Playback rate of the encoded video
    pub fps: u32,
    /// Frames decoded per chunk; trades throughput for memory
    pub decode_chunk_size: u32,
    /// How much the scene moves across the clip, 0.0 to 1.0
    pub motion_strength: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 576,
            frames: 25,
            fps: 7,
            decode_chunk_size: 8,
            motion_strength: 0.15,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err("width and height must be even".to_string());
        }
        if self.frames == 0 {
            return Err("frames must be greater than 0".to_string());
        }
        if self.fps == 0 {
            return Err("fps must be greater than 0".to_string());
        }
        if self.decode_chunk_size == 0 {
            return Err("decode_chunk_size must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.motion_strength) {
            return Err("motion_strength must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}

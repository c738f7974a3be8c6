//! Input normalization

use image::RgbImage;
use image::imageops::FilterType;

/// Decodes an uploaded image and resizes it to exactly `width`x`height`
///
/// Alpha is dropped and the aspect ratio is not preserved, matching what the
/// model expects as conditioning input.
pub fn normalize(bytes: &[u8], width: u32, height: u32) -> Result<RgbImage, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let resized = if decoded.width() == width && decoded.height() == height {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Lanczos3)
    };
    Ok(resized.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, image::Rgba([200, 100, 50, 128]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn test_resizes_to_target() {
        let out = normalize(&png(40, 10), 16, 8).unwrap();
        assert_eq!(out.dimensions(), (16, 8));
    }

    #[test]
    fn test_is_deterministic() {
        let bytes = png(33, 21);
        assert_eq!(normalize(&bytes, 16, 8).unwrap(), normalize(&bytes, 16, 8).unwrap());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(normalize(b"definitely not an image", 16, 8).is_err());
    }
}

//! JPEG data URI encoding for transport to the browser

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hemascope_core::EncodingConfig;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use tracing::warn;

use crate::error::VisionError;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Clone)]
pub struct ImageEncoder {
    max_dimension: u32,
    quality: u8,
}

impl ImageEncoder {
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &EncodingConfig) -> Self {
        Self::new(config.max_dimension, config.quality)
    }

    /// Encode `image` as a JPEG data URI, or an empty string on failure
    pub fn encode(&self, image: &RgbImage) -> String {
        match self.try_encode(image) {
            Ok(uri) => uri,
            Err(e) => {
                warn!("Error encoding image: {}", e);
                String::new()
            }
        }
    }

    pub fn try_encode(&self, image: &RgbImage) -> Result<String, VisionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::Processing("Cannot encode an empty image".to_string()));
        }

        let scaled = self.downscale(image);
        let source = scaled.as_ref().unwrap_or(image);

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.quality).encode_image(source)?;

        Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(&buffer)))
    }

    /// Fit `image` within `max_dimension` on both sides, keeping aspect
    /// ratio. `None` when it already fits.
    pub fn downscale(&self, image: &RgbImage) -> Option<RgbImage> {
        let (width, height) = image.dimensions();
        let (new_w, new_h) = self.target_dimensions(width, height)?;
        Some(image::imageops::resize(image, new_w, new_h, FilterType::Lanczos3))
    }

    /// Output size for a `width` x `height` input, `None` when unchanged
    pub fn target_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        fit_within(width, height, self.max_dimension)
    }
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::from_config(&EncodingConfig::default())
    }
}

fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max_dimension {
        return None;
    }
    let scale = |side: u32| (side as u64 * max_dimension as u64 / longest as u64).max(1) as u32;
    Some((scale(width), scale(height)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(uri: &str) -> image::DynamicImage {
        let payload = uri.strip_prefix(DATA_URI_PREFIX).expect("data URI prefix");
        let bytes = STANDARD.decode(payload).unwrap();
        image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg).unwrap()
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(2000, 1000, 800), Some((800, 400)));
        assert_eq!(fit_within(600, 1200, 800), Some((400, 800)));
        assert_eq!(fit_within(800, 800, 800), None);
        assert_eq!(fit_within(5000, 1, 800), Some((800, 1)));
        // truncated, not rounded
        assert_eq!(fit_within(1000, 999, 800), Some((800, 799)));
    }

    #[test]
    fn test_large_image_is_downscaled() {
        let image = RgbImage::new(2000, 1000);
        let uri = ImageEncoder::default().encode(&image);
        assert!(uri.starts_with(DATA_URI_PREFIX));

        let decoded = decode(&uri);
        assert_eq!((decoded.width(), decoded.height()), (800, 400));
    }

    #[test]
    fn test_small_image_keeps_size() {
        let image = RgbImage::from_pixel(120, 80, image::Rgb([200, 10, 10]));
        let decoded = decode(&ImageEncoder::default().encode(&image));
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }

    #[test]
    fn test_empty_image_encodes_to_empty_string() {
        let encoder = ImageEncoder::new(800, 85);
        assert_eq!(encoder.encode(&RgbImage::new(0, 0)), "");
        assert!(encoder.try_encode(&RgbImage::new(0, 10)).is_err());
    }

    #[test]
    fn test_quality_is_clamped() {
        let encoder = ImageEncoder::new(0, 0);
        assert_eq!(encoder.quality, 1);
        assert_eq!(encoder.max_dimension, 1);
    }
}

//! Utility functions for vision processing

use image::RgbImage;

use crate::error::VisionError;

/// Convert an RGB image to a CHW float32 tensor normalized to [0, 1]
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
pub fn image_to_chw_tensor(image: &RgbImage) -> Result<Vec<f32>, VisionError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(VisionError::Processing("Invalid image dimensions".to_string()));
    }

    let plane = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| VisionError::Processing("Image dimensions would overflow".to_string()))?;

    let raw = image.as_raw();
    let mut chw = vec![0.0f32; plane * 3];
    for idx in 0..plane {
        chw[idx] = raw[idx * 3] as f32 / 255.0;
        chw[plane + idx] = raw[idx * 3 + 1] as f32 / 255.0;
        chw[2 * plane + idx] = raw[idx * 3 + 2] as f32 / 255.0;
    }

    Ok(chw)
}

/// Centered crop window `(left, top, width, height)` for a zoom factor.
/// A factor of 1.0 returns the full frame.
pub fn center_crop_window(width: u32, height: u32, zoom_factor: f32) -> (u32, u32, u32, u32) {
    let zoom = if zoom_factor.is_finite() && zoom_factor >= 1.0 { zoom_factor } else { 1.0 };
    let new_w = ((width as f64 / zoom as f64) as u32).clamp(1, width.max(1));
    let new_h = ((height as f64 / zoom as f64) as u32).clamp(1, height.max(1));
    let left = width.saturating_sub(new_w) / 2;
    let top = height.saturating_sub(new_h) / 2;
    (left, top, new_w, new_h)
}

/// Crop the centered region of `image` selected by `zoom_factor`
pub fn center_crop(image: &RgbImage, zoom_factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let (left, top, new_w, new_h) = center_crop_window(width, height, zoom_factor);
    if (left, top, new_w, new_h) == (0, 0, width, height) {
        return image.clone();
    }
    image::imageops::crop_imm(image, left, top, new_w, new_h).to_image()
}

/// Scale an `[x1, y1, x2, y2]` box independently per axis
pub fn rescale_box(bbox: [f32; 4], scale_x: f32, scale_y: f32) -> [f32; 4] {
    [
        bbox[0] * scale_x,
        bbox[1] * scale_y,
        bbox[2] * scale_x,
        bbox[3] * scale_y,
    ]
}

/// Best-effort message from a caught panic payload
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unexpected panic".to_string()
    }
}

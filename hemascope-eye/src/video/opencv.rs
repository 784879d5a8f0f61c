//! In-process decoding through OpenCV's `VideoCapture`

use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT},
};
use std::path::Path;
use tracing::info;

use super::{VideoDecoder, VideoOpener};
use crate::error::VisionError;

#[derive(Debug, Clone, Default)]
pub struct OpenCvOpener;

impl VideoOpener for OpenCvOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>, VisionError> {
        Ok(Box::new(OpenCvDecoder::open(path)?))
    }
}

pub struct OpenCvDecoder {
    capture: VideoCapture,
    frame_count: Option<u64>,
    frame_rate: Option<f64>,
}

impl OpenCvDecoder {
    pub fn open(path: &Path) -> Result<Self, VisionError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VisionError::Decode(format!("Non UTF-8 video path: {:?}", path)))?;

        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .map_err(|e| VisionError::Decode(format!("Cannot open video file {:?}: {}", path, e)))?;

        if !capture.is_opened()? {
            return Err(VisionError::Decode(format!("Cannot open video file: {:?}", path)));
        }

        let count = capture.get(CAP_PROP_FRAME_COUNT)?;
        let fps = capture.get(CAP_PROP_FPS)?;
        let frame_count = (count.is_finite() && count > 0.0).then_some(count as u64);
        let frame_rate = (fps.is_finite() && fps > 0.0).then_some(fps);

        info!(
            "Opened {:?} with OpenCV: {:?} frames at {:?} fps",
            path, frame_count, frame_rate
        );

        Ok(Self {
            capture,
            frame_count,
            frame_rate,
        })
    }
}

impl VideoDecoder for OpenCvDecoder {
    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VisionError> {
        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr)? || bgr.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb.data_bytes()?.to_vec();

        RgbImage::from_raw(width, height, data)
            .map(Some)
            .ok_or_else(|| VisionError::Decode("Frame buffer size mismatch".to_string()))
    }
}

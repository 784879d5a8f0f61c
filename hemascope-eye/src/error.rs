//! Error types for hemascope-eye

use hemascope_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported video source: {0}")]
    UnsupportedSource(String),

    #[error("Video too long ({duration}s). Maximum is {max}s")]
    VideoTooLong { duration: u64, max: u64 },

    #[error("Video download failed: {0}")]
    Download(String),

    #[error("External tool error: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl VisionError {
    /// True when the caller supplied something unusable rather than the
    /// service failing
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VisionError::UnsupportedSource(_) | VisionError::VideoTooLong { .. }
        )
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for VisionError {
    fn from(err: ort::Error) -> Self {
        VisionError::Ort(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

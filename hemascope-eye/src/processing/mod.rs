//! Per-frame processing stages

pub mod detection;
pub mod annotation;
pub mod encoding;

pub use detection::{Detection, FrameDetection, FrameDetector};
pub use annotation::Annotator;
pub use encoding::ImageEncoder;

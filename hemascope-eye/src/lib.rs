//! hemascope-eye: frame sampling and detection pipeline
//!
//! Samples frames from a video (or takes a single image), runs them through
//! an SSD300 cell detector, draws the detections and encodes the results as
//! data URIs for a web client.

pub mod error;
pub mod models;
pub mod processing;
pub mod video;
pub mod source;
pub mod pipeline;
mod utils;

pub use error::VisionError;
pub use models::{load_model, Candidate, DetectionModel, LoadedModel, ModelStatus};
pub use processing::{Annotator, Detection, FrameDetection, FrameDetector, ImageEncoder};
pub use video::{FrameSampler, SampledFrame, VideoDecoder, VideoOpener};
pub use source::{VideoSourceResolver, YtDlpResolver};
pub use pipeline::{ClassStatistics, FrameRecord, ImageAnalysis, VideoPipeline, VideoResult};

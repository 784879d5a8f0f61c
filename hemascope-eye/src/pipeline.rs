//! Video and single-image analysis
//!
//! [`VideoPipeline::process_video`] resolves a URL to a local file, samples
//! it, and runs every sampled frame through detection, annotation and
//! encoding. It never fails: errors come back as a `VideoResult` with
//! `success == false`.

use hemascope_core::{ClassTable, HemascopeConfig};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::VisionError;
use crate::models::LoadedModel;
use crate::processing::{Annotator, Detection, FrameDetector, ImageEncoder};
use crate::source::{VideoSourceResolver, YtDlpResolver};
use crate::utils::panic_message;
use crate::video::{FrameSampler, VideoOpener};

/// Running per-class detection counts
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStatistics {
    counts: BTreeMap<String, u64>,
    total: u64,
}

impl ClassStatistics {
    /// Counts seeded at zero for every foreground class
    pub fn new(classes: &ClassTable) -> Self {
        Self {
            counts: classes.foreground().iter().map(|name| (name.clone(), 0)).collect(),
            total: 0,
        }
    }

    /// Count one detection. Labels outside the seeded set are ignored.
    pub fn record(&mut self, class_name: &str) -> bool {
        match self.counts.get_mut(class_name) {
            Some(count) => {
                *count += 1;
                self.total += 1;
                true
            }
            None => false,
        }
    }

    pub fn count(&self, class_name: &str) -> Option<u64> {
        self.counts.get(class_name).copied()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }
}

/// Result for one sampled frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Ordinal among sampled frames
    pub frame_index: usize,
    /// Index of the frame in the source stream
    pub source_frame_index: u64,
    pub detections: Vec<Detection>,
    pub detection_count: usize,
    /// Annotated frame as a JPEG data URI
    pub frame_image: String,
    pub original_frame: String,
    pub timestamp: String,
}

/// Aggregate outcome of a video analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResult {
    pub success: bool,
    pub total_frames_processed: usize,
    pub total_detections: u64,
    pub class_statistics: BTreeMap<String, u64>,
    pub frame_results: Vec<FrameRecord>,
    pub average_detections_per_frame: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The failure was caused by the request (bad source, video too long)
    /// rather than by the service
    #[serde(skip)]
    pub rejected: bool,
}

impl VideoResult {
    fn completed(statistics: ClassStatistics, frame_results: Vec<FrameRecord>) -> Self {
        let frames = frame_results.len();
        let average = if frames == 0 {
            0.0
        } else {
            statistics.total as f64 / frames as f64
        };

        Self {
            success: true,
            total_frames_processed: frames,
            total_detections: statistics.total,
            class_statistics: statistics.counts,
            frame_results,
            average_detections_per_frame: average,
            error: None,
            rejected: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            total_frames_processed: 0,
            total_detections: 0,
            class_statistics: BTreeMap::new(),
            frame_results: Vec::new(),
            average_detections_per_frame: 0.0,
            error: Some(message.into()),
            rejected: false,
        }
    }

    /// Failure caused by the request itself
    pub fn rejection(message: impl Into<String>) -> Self {
        Self {
            rejected: true,
            ..Self::failure(message)
        }
    }

    fn from_error(err: &VisionError) -> Self {
        if err.is_client_error() {
            Self::rejection(err.to_string())
        } else {
            Self::failure(err.to_string())
        }
    }
}

/// Detections for a single uploaded image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub detections: Vec<Detection>,
    pub total_detections: usize,
    /// `[width, height]` of the decoded upload
    pub original_image_size: [u32; 2],
    pub processed_image: String,
    pub original_image: String,
}

/// `"{seconds:.2}s"` for a source frame at `fps`
pub fn format_timestamp(source_index: u64, fps: f64) -> String {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
    format!("{:.2}s", source_index as f64 / fps)
}

pub struct VideoPipeline {
    detector: Arc<FrameDetector>,
    annotator: Annotator,
    encoder: ImageEncoder,
    resolver: Arc<dyn VideoSourceResolver>,
    opener: Arc<dyn VideoOpener>,
    work_dir: TempDir,
    max_frames_cap: usize,
    assumed_fps: f64,
}

impl VideoPipeline {
    pub fn new(
        detector: Arc<FrameDetector>,
        annotator: Annotator,
        encoder: ImageEncoder,
        resolver: Arc<dyn VideoSourceResolver>,
        opener: Arc<dyn VideoOpener>,
    ) -> Result<Self, VisionError> {
        let work_dir = tempfile::Builder::new().prefix("hemascope-").tempdir()?;
        debug!("Pipeline work directory {:?}", work_dir.path());

        Ok(Self {
            detector,
            annotator,
            encoder,
            resolver,
            opener,
            work_dir,
            max_frames_cap: 100,
            assumed_fps: 30.0,
        })
    }

    /// Pipeline wired from configuration with the default resolver and decoder
    pub fn from_config(config: &HemascopeConfig, model: &LoadedModel) -> Result<Self, VisionError> {
        let detector = FrameDetector::new(
            model.model.clone(),
            ClassTable::new(config.detection.class_names.clone()),
            config.detection.input_size,
        )
        .with_zoom_factor(config.detection.zoom_factor);

        let pipeline = Self::new(
            Arc::new(detector),
            Annotator::new(&config.annotation),
            ImageEncoder::from_config(&config.encoding),
            Arc::new(YtDlpResolver::new(&config.video)),
            default_opener(config),
        )?;

        Ok(pipeline
            .with_max_frames_cap(config.video.max_frames_cap)
            .with_assumed_fps(config.video.assumed_fps))
    }

    pub fn with_max_frames_cap(mut self, cap: usize) -> Self {
        self.max_frames_cap = cap;
        self
    }

    /// Frame rate used for timestamps when the decoder reports none
    pub fn with_assumed_fps(mut self, fps: f64) -> Self {
        self.assumed_fps = fps;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn VideoSourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn VideoOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn detector(&self) -> &FrameDetector {
        &self.detector
    }

    pub fn max_frames_cap(&self) -> usize {
        self.max_frames_cap
    }

    /// Analyze up to `max_frames` frames of the video at `url`. The request
    /// is capped at the configured maximum.
    pub fn process_video(&self, url: &str, max_frames: usize, confidence_threshold: f32) -> VideoResult {
        let max_frames = max_frames.min(self.max_frames_cap);
        info!("Processing video {} (max {} frames)", url, max_frames);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_video(url, max_frames, confidence_threshold)
        }));

        let result = match outcome {
            Ok(Ok(result)) => {
                info!(
                    "Video processed: {} frames, {} detections",
                    result.total_frames_processed, result.total_detections
                );
                return result;
            }
            Ok(Err(e)) => VideoResult::from_error(&e),
            Err(payload) => VideoResult::failure(panic_message(payload)),
        };

        warn!(
            "Video processing failed: {}",
            result.error.as_deref().unwrap_or_default()
        );
        result
    }

    fn run_video(
        &self,
        url: &str,
        max_frames: usize,
        confidence_threshold: f32,
    ) -> Result<VideoResult, VisionError> {
        let job_dir = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(self.work_dir.path())?;

        let result = self
            .resolver
            .resolve(url, job_dir.path())
            .and_then(|path| self.process_file(&path, max_frames, confidence_threshold));

        let job_path = job_dir.path().to_path_buf();
        if let Err(e) = job_dir.close() {
            warn!("Failed to remove downloaded video in {:?}: {}", job_path, e);
        }

        result
    }

    /// Sample and analyze a local video file
    pub fn process_file(
        &self,
        path: &Path,
        max_frames: usize,
        confidence_threshold: f32,
    ) -> Result<VideoResult, VisionError> {
        let decoder = self.opener.open(path)?;
        let sampler = FrameSampler::new(decoder, max_frames);
        let fps = sampler.frame_rate().unwrap_or(self.assumed_fps);

        let mut statistics = ClassStatistics::new(self.detector.classes());
        let mut frame_results = Vec::new();

        for (frame_index, sampled) in sampler.enumerate() {
            if frame_index >= max_frames {
                break;
            }

            let record = self.process_frame(
                frame_index,
                sampled.source_index,
                &sampled.image,
                fps,
                confidence_threshold,
            );
            for detection in &record.detections {
                statistics.record(&detection.class_name);
            }

            debug!(
                "Processed frame {}/{} ({} detections)",
                frame_index + 1,
                max_frames,
                record.detection_count
            );
            frame_results.push(record);
        }

        Ok(VideoResult::completed(statistics, frame_results))
    }

    fn process_frame(
        &self,
        frame_index: usize,
        source_index: u64,
        frame: &RgbImage,
        fps: f64,
        confidence_threshold: f32,
    ) -> FrameRecord {
        let detection = self.detector.detect(frame, confidence_threshold);
        let annotated = self.annotator.annotate(&detection.image, &detection.detections);

        FrameRecord {
            frame_index,
            source_frame_index: source_index,
            detection_count: detection.detections.len(),
            frame_image: self.encoder.encode(&annotated),
            original_frame: self.encoder.encode(&detection.image),
            timestamp: format_timestamp(source_index, fps),
            detections: detection.detections,
        }
    }

    /// Detect, annotate and encode a single encoded image
    pub fn process_image(
        &self,
        bytes: &[u8],
        confidence_threshold: f32,
    ) -> Result<ImageAnalysis, VisionError> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = image.dimensions();

        let detection = self.detector.try_detect(&image, confidence_threshold)?;
        let annotated = self.annotator.annotate(&detection.image, &detection.detections);

        Ok(ImageAnalysis {
            total_detections: detection.detections.len(),
            original_image_size: [width, height],
            processed_image: self.encoder.try_encode(&annotated)?,
            original_image: self.encoder.try_encode(&image)?,
            detections: detection.detections,
        })
    }
}

#[cfg(not(feature = "opencv"))]
fn default_opener(config: &HemascopeConfig) -> Arc<dyn VideoOpener> {
    Arc::new(crate::video::FfmpegOpener::new(
        config.video.ffmpeg_path.clone(),
        config.video.ffprobe_path.clone(),
    ))
}

#[cfg(feature = "opencv")]
fn default_opener(_config: &HemascopeConfig) -> Arc<dyn VideoOpener> {
    Arc::new(crate::video::OpenCvOpener)
}

// HTTP server with detection API routes

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hemascope_eye::source::validate_url;
use hemascope_eye::{Detection, ModelStatus, VideoResult, VisionError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::context::AppContext;

pub type SharedContext = Arc<AppContext>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Request failure mapped to a status code and an [`ErrorResponse`] body
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { message: String, code: &'static str },

    #[error("Model not loaded: {0}")]
    ModelUnavailable(String),

    #[error("{message}")]
    Internal { message: String, code: &'static str },
}

impl ApiError {
    fn bad_request(message: impl Into<String>, code: &'static str) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            code,
        }
    }

    fn internal(message: impl Into<String>, code: &'static str) -> Self {
        ApiError::Internal {
            message: message.into(),
            code,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable(_) | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } | ApiError::Internal { code, .. } => *code,
            ApiError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
        }
    }
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match &err {
            VisionError::UnsupportedSource(_) => ApiError::bad_request(err.to_string(), "UNSUPPORTED_SOURCE"),
            VisionError::VideoTooLong { .. } => ApiError::bad_request(err.to_string(), "VIDEO_TOO_LONG"),
            VisionError::Image(_) => ApiError::bad_request(err.to_string(), "INVALID_IMAGE"),
            _ => ApiError::internal(err.to_string(), "PROCESSING_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });
        (status, body).into_response()
    }
}

// Response types
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_status: ModelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub device: String,
    pub model_type: String,
    pub classes: Vec<String>,
    pub note: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ClassesResponse {
    pub classes: Vec<String>,
    pub total_classes: usize,
    pub class_mapping: BTreeMap<usize, String>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_type: String,
    pub training_target: &'static str,
    pub classes: Vec<String>,
    pub input_size: String,
    pub framework: &'static str,
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub detections: Vec<Detection>,
    pub total_detections: usize,
    pub original_image_size: [u32; 2],
    pub processed_image: String,
    pub original_image: String,
    pub class_names: Vec<String>,
    pub model_info: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct YoutubeResponse {
    #[serde(flatten)]
    pub result: VideoResult,
    pub video_url: String,
    pub model_info: serde_json::Value,
    pub processing_note: String,
}

#[derive(Debug, Serialize)]
pub struct VideoLimitsResponse {
    pub max_duration_seconds: u64,
    pub max_frames_per_video: usize,
    pub recommended_frames: usize,
    pub supported_formats: Vec<String>,
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictParams {
    pub confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct YoutubeRequest {
    pub url: String,
    pub max_frames: Option<usize>,
    pub confidence_threshold: Option<f32>,
}

/// Create HTTP router with all API routes
pub fn create_router(context: SharedContext) -> Router {
    let body_limit = context.config.server.max_upload_bytes;
    let cors = cors_layer(&context.config.server.cors_origins);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/classes", get(classes_handler))
        .route("/model-info", get(model_info_handler))
        .route("/video-limits", get(video_limits_handler))
        .route("/predict", post(predict_handler))
        .route("/predict-youtube", post(predict_youtube_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

fn ensure_model(context: &AppContext) -> Result<(), ApiError> {
    if context.refuses_requests() {
        let reason = context.model_status.reason().unwrap_or("trained weights unavailable");
        return Err(ApiError::ModelUnavailable(reason.to_string()));
    }
    Ok(())
}

fn check_threshold(threshold: f32) -> Result<f32, ApiError> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ApiError::bad_request(
            "confidence_threshold must be between 0 and 1",
            "INVALID_THRESHOLD",
        ))
    }
}

fn model_note(context: &AppContext) -> &'static str {
    if context.model_status.is_degraded() {
        "Running untrained model; predictions are not meaningful"
    } else {
        "Using trained weights for blood cell detection"
    }
}

async fn root_handler(State(context): State<SharedContext>) -> impl IntoResponse {
    let message = if context.model_status.is_degraded() {
        "Blood Cell Detection API (untrained model)"
    } else {
        "Blood Cell Detection API"
    };
    Json(json!({ "message": message }))
}

/// Health check endpoint
async fn health_handler(State(context): State<SharedContext>) -> impl IntoResponse {
    let degraded = context.model_status.is_degraded();
    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" },
        model_loaded: true,
        model_status: context.model_status.clone(),
        degraded_reason: context.model_status.reason().map(str::to_string),
        device: context.device.clone(),
        model_type: context.model_name.clone(),
        classes: context.class_names().to_vec(),
        note: model_note(&context),
    })
}

async fn classes_handler(State(context): State<SharedContext>) -> impl IntoResponse {
    let classes = context.pipeline.detector().classes();
    Json(ClassesResponse {
        classes: classes.foreground().to_vec(),
        total_classes: classes.foreground().len(),
        class_mapping: classes.class_mapping(),
    })
}

async fn model_info_handler(State(context): State<SharedContext>) -> impl IntoResponse {
    let size = context.config.detection.input_size;
    Json(ModelInfoResponse {
        model_type: context.model_name.clone(),
        training_target: "Blood cell detection (BCCD dataset)",
        classes: context.class_names().to_vec(),
        input_size: format!("{}x{}", size, size),
        framework: "ONNX Runtime",
        note: model_note(&context).to_string(),
    })
}

async fn video_limits_handler(State(context): State<SharedContext>) -> impl IntoResponse {
    let video = &context.config.video;
    Json(VideoLimitsResponse {
        max_duration_seconds: video.max_duration_secs,
        max_frames_per_video: video.max_frames_cap,
        recommended_frames: video.default_max_frames,
        supported_formats: video.supported_formats.clone(),
        note: format!(
            "Clips up to {}s may run {}s; longer videos are limited to {}s",
            video.short_form_threshold_secs,
            video.short_form_max_duration_secs,
            video.max_duration_secs
        ),
    })
}

/// Detect cells in a single uploaded image
async fn predict_handler(
    State(context): State<SharedContext>,
    params: Result<Query<PredictParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    ensure_model(&context)?;
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text(), "INVALID_REQUEST"))?;
    let threshold = check_threshold(
        params
            .confidence_threshold
            .unwrap_or(context.config.detection.confidence_threshold),
    )?;

    let mut multipart =
        multipart.map_err(|e| ApiError::bad_request(e.body_text(), "INVALID_MULTIPART"))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text(), "INVALID_MULTIPART"))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(ApiError::bad_request("File must be an image", "INVALID_CONTENT_TYPE"));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text(), "INVALID_MULTIPART"))?;
        upload = Some(bytes);
        break;
    }

    let bytes = upload.ok_or_else(|| ApiError::bad_request("Missing 'file' field", "MISSING_FILE"))?;
    info!("Predicting on uploaded image ({} bytes)", bytes.len());

    let pipeline = context.pipeline.clone();
    let analysis = tokio::task::spawn_blocking(move || pipeline.process_image(&bytes, threshold))
        .await
        .map_err(|e| ApiError::internal(format!("Prediction task failed: {}", e), "PROCESSING_ERROR"))??;

    Ok(Json(PredictResponse {
        success: true,
        total_detections: analysis.total_detections,
        original_image_size: analysis.original_image_size,
        processed_image: analysis.processed_image,
        original_image: analysis.original_image,
        detections: analysis.detections,
        class_names: context.class_names().to_vec(),
        model_info: model_info(&context),
    }))
}

fn model_info(context: &AppContext) -> serde_json::Value {
    json!({
        "type": context.model_name,
        "device": context.device,
        "status": context.model_status,
    })
}

/// Sample and analyze a YouTube video
async fn predict_youtube_handler(
    State(context): State<SharedContext>,
    request: Result<Json<YoutubeRequest>, JsonRejection>,
) -> Result<Json<YoutubeResponse>, ApiError> {
    ensure_model(&context)?;
    let Json(request) = request.map_err(|e| ApiError::bad_request(e.body_text(), "INVALID_REQUEST"))?;

    validate_url(&request.url, &context.config.video.allowed_domains)?;
    let threshold = check_threshold(
        request
            .confidence_threshold
            .unwrap_or(context.config.detection.confidence_threshold),
    )?;
    let video = &context.config.video;
    let max_frames = request
        .max_frames
        .unwrap_or(video.default_max_frames)
        .clamp(1, video.max_frames_cap);

    info!("Processing YouTube video {} ({} frames)", request.url, max_frames);

    let pipeline = context.pipeline.clone();
    let url = request.url.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.process_video(&url, max_frames, threshold))
        .await
        .map_err(|e| ApiError::internal(format!("Video task failed: {}", e), "PROCESSING_ERROR"))?;

    if !result.success {
        let message = result.error.unwrap_or_else(|| "Video processing failed".to_string());
        return Err(if result.rejected {
            ApiError::bad_request(message, "VIDEO_PROCESSING_FAILED")
        } else {
            ApiError::internal(message, "PROCESSING_ERROR")
        });
    }

    Ok(Json(YoutubeResponse {
        processing_note: format!(
            "Processed {} frames from YouTube video",
            result.total_frames_processed
        ),
        model_info: model_info(&context),
        video_url: request.url,
        result,
    }))
}

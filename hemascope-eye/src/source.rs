//! Remote video retrieval
//!
//! Turns a user-supplied URL into a local file the decoder can open. The
//! default resolver shells out to `yt-dlp`.

use hemascope_core::VideoConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};
use url::Url;

use crate::error::VisionError;

const DOWNLOAD_FORMAT: &str = "best[height<=720][ext=mp4]/best[ext=mp4]/best";
const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "avi"];

/// Resolves a video URL to a file inside `work_dir`
pub trait VideoSourceResolver: Send + Sync {
    fn resolve(&self, url: &str, work_dir: &Path) -> Result<PathBuf, VisionError>;
}

/// Parse `url` and check it points at one of `allowed_domains` (or a
/// subdomain of one) over http(s)
pub fn validate_url(url: &str, allowed_domains: &[String]) -> Result<Url, VisionError> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| VisionError::UnsupportedSource(format!("Invalid URL '{}': {}", url, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(VisionError::UnsupportedSource(format!(
            "Unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| VisionError::UnsupportedSource(format!("URL has no host: {}", url)))?
        .to_ascii_lowercase();

    let allowed = allowed_domains.iter().any(|domain| {
        let domain = domain.trim().to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    });

    if !allowed {
        return Err(VisionError::UnsupportedSource(format!(
            "Only {} URLs are supported",
            allowed_domains.join(", ")
        )));
    }

    Ok(parsed)
}

/// Longest accepted duration for a clip of `duration_secs`. Short-form
/// clips get their own ceiling.
pub fn duration_ceiling(duration_secs: f64, config: &VideoConfig) -> u64 {
    if duration_secs > config.short_form_threshold_secs as f64 {
        config.max_duration_secs
    } else {
        config.short_form_max_duration_secs
    }
}

/// Reject clips longer than their ceiling. An unknown duration passes.
/// Fractional seconds count: 300.4s is over a 300s ceiling.
pub fn check_duration(duration_secs: Option<f64>, config: &VideoConfig) -> Result<(), VisionError> {
    match duration_secs {
        Some(duration) if duration.is_finite() && duration > 0.0 => {
            let max = duration_ceiling(duration, config);
            if duration > max as f64 {
                Err(VisionError::VideoTooLong {
                    duration: duration.ceil() as u64,
                    max,
                })
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
struct VideoMetadata {
    id: String,
    duration: Option<f64>,
}

/// Resolver backed by the `yt-dlp` executable
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    ytdlp_path: PathBuf,
    config: VideoConfig,
}

impl YtDlpResolver {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            ytdlp_path: config.ytdlp_path.clone(),
            config: config.clone(),
        }
    }

    fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, VisionError> {
        let output = Command::new(&self.ytdlp_path)
            .args(["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings"])
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| VisionError::Download(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            return Err(VisionError::Download(format!(
                "yt-dlp metadata lookup failed: {}",
                error_msg.trim()
            )));
        }

        parse_metadata(&output.stdout)
    }

    fn download(&self, url: &str, work_dir: &Path) -> Result<(), VisionError> {
        let output = Command::new(&self.ytdlp_path)
            .args(["--no-playlist", "--quiet", "--no-warnings", "-f", DOWNLOAD_FORMAT, "-o"])
            .arg(work_dir.join(OUTPUT_TEMPLATE))
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| VisionError::Download(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            return Err(VisionError::Download(format!(
                "yt-dlp download failed: {}",
                error_msg.trim()
            )));
        }
        Ok(())
    }
}

impl VideoSourceResolver for YtDlpResolver {
    fn resolve(&self, url: &str, work_dir: &Path) -> Result<PathBuf, VisionError> {
        let url = validate_url(url, &self.config.allowed_domains)?;

        let metadata = self.fetch_metadata(url.as_str())?;
        let duration = metadata.duration;
        debug!("Video {} reports duration {:?}s", metadata.id, duration);
        check_duration(duration, &self.config)?;

        info!("Downloading video {} into {:?}", metadata.id, work_dir);
        self.download(url.as_str(), work_dir)?;

        find_download(work_dir, &metadata.id)?.ok_or_else(|| {
            VisionError::Download(format!("Could not find downloaded video for {}", metadata.id))
        })
    }
}

fn parse_metadata(json: &[u8]) -> Result<VideoMetadata, VisionError> {
    serde_json::from_slice(json)
        .map_err(|e| VisionError::Download(format!("Unreadable yt-dlp metadata: {}", e)))
}

/// First file in `dir` named `<id>.<ext>` with a video extension
fn find_download(dir: &Path, id: &str) -> Result<Option<PathBuf>, VisionError> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.file_stem().and_then(|s| s.to_str()) == Some(id))
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}

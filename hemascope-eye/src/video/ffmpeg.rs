//! Decoding through the `ffprobe`/`ffmpeg` command line tools
//!
//! `ffprobe` supplies stream metadata, then `ffmpeg` streams raw RGB24
//! frames over a pipe. No native bindings are needed; the tools only have
//! to be on `PATH` (or configured explicitly).

use image::RgbImage;
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

use super::{VideoDecoder, VideoOpener};
use crate::error::VisionError;

/// Opens files with [`FfmpegDecoder`]
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegOpener {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl VideoOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>, VisionError> {
        let decoder = FfmpegDecoder::open(path, &self.ffmpeg_path, &self.ffprobe_path)?;
        Ok(Box::new(decoder))
    }
}

/// Stream metadata reported by `ffprobe`
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: Option<u64>,
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output for the first video stream
pub fn parse_probe(json: &[u8]) -> Result<StreamInfo, VisionError> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| VisionError::Decode(format!("Unreadable ffprobe output: {}", e)))?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| VisionError::Decode("No video stream found".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(VisionError::Decode("Video stream has no dimensions".to_string())),
    };

    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_rate));

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    let frame_count = stream
        .nb_frames
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .or_else(|| match (duration, frame_rate) {
            (Some(d), Some(fps)) => Some((d * fps).round() as u64),
            _ => None,
        });

    Ok(StreamInfo {
        width,
        height,
        frame_count,
        frame_rate,
    })
}

/// Parse an ffmpeg rational such as `30000/1001`
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Raw-frame pipe from an `ffmpeg` child process
pub struct FfmpegDecoder {
    info: StreamInfo,
    child: Child,
    stdout: ChildStdout,
    frame_len: usize,
    finished: bool,
}

impl FfmpegDecoder {
    pub fn open(path: &Path, ffmpeg: &Path, ffprobe: &Path) -> Result<Self, VisionError> {
        if !path.is_file() {
            return Err(VisionError::Decode(format!("Cannot open video file: {:?}", path)));
        }

        let info = probe(path, ffprobe)?;
        let frame_len = (info.width as usize)
            .checked_mul(info.height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| VisionError::Decode("Frame dimensions overflow".to_string()))?;

        let mut child = Command::new(ffmpeg)
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VisionError::Tool(format!("Failed to execute ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VisionError::Tool("ffmpeg stdout not captured".to_string()))?;

        info!(
            "Opened {:?}: {}x{}, {:?} frames at {:?} fps",
            path, info.width, info.height, info.frame_count, info.frame_rate
        );

        Ok(Self {
            info,
            child,
            stdout,
            frame_len,
            finished: false,
        })
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn finish(&mut self) -> Result<(), VisionError> {
        self.finished = true;
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(VisionError::Decode(format!("ffmpeg exited with {}", status)))
        }
    }
}

fn probe(path: &Path, ffprobe: &Path) -> Result<StreamInfo, VisionError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,nb_frames,r_frame_rate,avg_frame_rate:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| VisionError::Tool(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        let error_msg = String::from_utf8_lossy(&output.stderr);
        return Err(VisionError::Decode(format!(
            "Cannot open video file {:?}: {}",
            path,
            error_msg.trim()
        )));
    }

    parse_probe(&output.stdout)
}

/// Fill `buf` from `reader`, returning how many bytes were read before EOF
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl VideoDecoder for FfmpegDecoder {
    fn frame_count(&self) -> Option<u64> {
        self.info.frame_count
    }

    fn frame_rate(&self) -> Option<f64> {
        self.info.frame_rate
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VisionError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        let filled = read_full(&mut self.stdout, &mut buf)?;

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < self.frame_len {
            self.finish()?;
            return Err(VisionError::Decode(format!(
                "Truncated frame: {} of {} bytes",
                filled, self.frame_len
            )));
        }

        let frame = RgbImage::from_raw(self.info.width, self.info.height, buf)
            .ok_or_else(|| VisionError::Decode("Frame buffer size mismatch".to_string()))?;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.child.kill() {
            debug!("ffmpeg already exited: {}", e);
        }
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap ffmpeg process: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("garbage"), None);
    }

    #[test]
    fn test_parse_probe_full() {
        let json = br#"{
            "streams": [{"width": 1280, "height": 720, "nb_frames": "900",
                         "r_frame_rate": "30/1", "avg_frame_rate": "30/1"}],
            "format": {"duration": "30.000000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.frame_count, Some(900));
        assert_eq!(info.frame_rate, Some(30.0));
    }

    #[test]
    fn test_parse_probe_estimates_missing_count() {
        let json = br#"{
            "streams": [{"width": 640, "height": 360, "r_frame_rate": "25/1"}],
            "format": {"duration": "10.0"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.frame_count, Some(250));
    }

    #[test]
    fn test_parse_probe_unknown_count() {
        let json = br#"{"streams": [{"width": 64, "height": 64, "r_frame_rate": "0/0"}]}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.frame_count, None);
        assert_eq!(info.frame_rate, None);
    }

    #[test]
    fn test_parse_probe_no_stream() {
        assert!(parse_probe(br#"{"streams": []}"#).is_err());
        assert!(parse_probe(b"not json").is_err());
    }

    #[test]
    fn test_read_full_reports_short_reads() {
        let mut data: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 5];
        assert_eq!(read_full(&mut data, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegOpener::default().open(Path::new("/nonexistent/video.mp4"));
        assert!(matches!(result, Err(VisionError::Decode(_))));
    }
}

//! Asset metadata resolution.
//!
//! Stills (`.jpg`, `.jpeg`, `.png`) are decoded for their dimensions only and
//! have zero duration. Anything else is treated as a video and handed to an
//! [`AssetProbe`] for frame count, frame rate and dimensions.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use crate::{MarionetteError, Result};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// What kind of media an asset is.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetKind {
    Image,
    Video { frame_count: u64, fps: f64 },
}

/// Resolved metadata for one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoAsset {
    pub filename: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub kind: AssetKind,
}

impl VideoAsset {
    /// Playback length: `frame_count / fps` for video, zero for stills.
    pub fn duration(&self) -> Duration {
        match self.kind {
            AssetKind::Image => Duration::ZERO,
            AssetKind::Video { frame_count, fps } => {
                Duration::try_from_secs_f64(frame_count as f64 / fps).unwrap_or(Duration::ZERO)
            }
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, AssetKind::Image)
    }

    /// Same metadata, relocated to another path with the same filename.
    pub(crate) fn at_path(&self, path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..self.clone()
        }
    }
}

/// Video stream properties reported by a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub fps: f64,
}

/// Reads stream properties from a video file.
///
/// Probes run on the blocking pool; implementations may shell out or do
/// synchronous file I/O.
pub trait AssetProbe: Send + Sync {
    fn probe_video(&self, path: &Path) -> Result<VideoStreamInfo>;
}

/// Probe backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `ffprobe` executable.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

impl AssetProbe for FfprobeProbe {
    fn probe_video(&self, path: &Path) -> Result<VideoStreamInfo> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,nb_frames,r_frame_rate,duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| MarionetteError::asset(path, format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MarionetteError::asset(
                path,
                format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        parse_probe_output(path, &output.stdout)
    }
}

fn parse_probe_output(path: &Path, stdout: &[u8]) -> Result<VideoStreamInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout)?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| MarionetteError::asset(path, "no video stream"))?;

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .unwrap_or(0.0);
    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.parse().ok()) {
        Some(n) => n,
        // some containers omit nb_frames; derive from the stream duration
        None => stream
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .map(|secs| (secs * fps).round() as u64)
            .unwrap_or(0),
    };

    Ok(VideoStreamInfo {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        frame_count,
        fps,
    })
}

/// Parse an ffprobe rational like `30000/1001`.
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then_some(num / den)
        }
        None => rate.trim().parse().ok(),
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolve metadata for the file at `path`.
pub fn resolve(path: &Path, probe: &dyn AssetProbe) -> Result<VideoAsset> {
    if !path.is_file() {
        return Err(MarionetteError::asset(path, "file not found"));
    }
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if is_image_path(path) {
        let (width, height) = image::image_dimensions(path)
            .map_err(|e| MarionetteError::asset(path, format!("unreadable image: {e}")))?;
        return Ok(VideoAsset {
            filename,
            path: path.to_path_buf(),
            width,
            height,
            kind: AssetKind::Image,
        });
    }

    let info = probe.probe_video(path)?;
    if !(info.fps.is_finite() && info.fps > 0.0) {
        return Err(MarionetteError::asset(
            path,
            format!("invalid frame rate {}", info.fps),
        ));
    }

    Ok(VideoAsset {
        filename,
        path: path.to_path_buf(),
        width: info.width,
        height: info.height,
        kind: AssetKind::Video {
            frame_count: info.frame_count,
            fps: info.fps,
        },
    })
}

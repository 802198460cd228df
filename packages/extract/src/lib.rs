#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Finds media files and reads their capture metadata.
//!
//! Images are probed with `exiftool`, videos with `ffprobe`; both tools
//! are invoked as subprocesses and their JSON output parsed. The
//! [`MetadataExtractor`] trait hides the tools so the indexing stage can
//! be tested without them.

pub mod enumerate;
pub mod exiftool;
pub mod ffprobe;
pub mod iso6709;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Image extensions (lowercase, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "heic", "heif", "png"];

/// Video extensions (lowercase, without the dot).
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4"];

/// Errors from enumeration or metadata extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The library root is missing or not a directory.
    #[error("Media library not found: {}", .0.display())]
    LibraryNotFound(PathBuf),

    /// An external tool exited unsuccessfully.
    #[error("{tool} failed: {message}")]
    ToolFailed {
        /// Tool name (`exiftool`, `ffprobe`).
        tool: &'static str,
        /// Exit status and stderr summary.
        message: String,
    },

    /// Tool output could not be interpreted.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

/// Image or video, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image probed with `exiftool`.
    Image,
    /// Video probed with `ffprobe`.
    Video,
}

impl MediaKind {
    /// Classifies a path by its (case-insensitive) extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// Metadata read from one media file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureMetadata {
    /// Capture time normalized to UTC.
    pub datetime_utc: Option<DateTime<Utc>>,
    /// Signed latitude.
    pub latitude: Option<f64>,
    /// Signed longitude.
    pub longitude: Option<f64>,
    /// Camera manufacturer.
    pub camera_make: Option<String>,
    /// Camera model.
    pub camera_model: Option<String>,
}

impl CaptureMetadata {
    /// Returns `(latitude, longitude)` when both are present.
    ///
    /// A zero component counts as missing: devices without a fix commonly
    /// write `0` rather than omitting the tag.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let latitude = self.latitude.filter(|v| is_usable_coordinate(*v))?;
        let longitude = self.longitude.filter(|v| is_usable_coordinate(*v))?;
        Some((latitude, longitude))
    }
}

fn is_usable_coordinate(value: f64) -> bool {
    value.is_finite() && value != 0.0
}

/// Reads capture metadata from a media file.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Probes `path`, already classified as `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the file cannot be probed.
    async fn extract(&self, path: &Path, kind: MediaKind) -> Result<CaptureMetadata, ExtractError>;
}

/// Extracts metadata with the `exiftool` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct ToolExtractor {
    exiftool: String,
    ffprobe: String,
}

impl Default for ToolExtractor {
    fn default() -> Self {
        Self {
            exiftool: "exiftool".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl ToolExtractor {
    /// Uses the given executables instead of the ones on `PATH`.
    #[must_use]
    pub fn with_binaries(exiftool: &str, ffprobe: &str) -> Self {
        Self {
            exiftool: exiftool.to_string(),
            ffprobe: ffprobe.to_string(),
        }
    }
}

#[async_trait]
impl MetadataExtractor for ToolExtractor {
    async fn extract(&self, path: &Path, kind: MediaKind) -> Result<CaptureMetadata, ExtractError> {
        match kind {
            MediaKind::Image => exiftool::probe(&self.exiftool, path).await,
            MediaKind::Video => ffprobe::probe(&self.ffprobe, path).await,
        }
    }
}

/// Runs a tool and returns its stdout, failing on a non-zero exit.
async fn run_tool(
    tool: &'static str,
    program: &str,
    args: &[&str],
    path: &Path,
) -> Result<Vec<u8>, ExtractError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .arg(path)
        .stdin(std::process::Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::ToolFailed {
            tool,
            message: format!("{} ({})", output.status, stderr.trim()),
        });
    }

    Ok(output.stdout)
}

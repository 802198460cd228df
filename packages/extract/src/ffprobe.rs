//! Video metadata via `ffprobe`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{CaptureMetadata, ExtractError, iso6709};

/// Tag holding the location on iPhone recordings.
const QUICKTIME_LOCATION_TAG: &str = "com.apple.quicktime.location.ISO6709";

/// Tag holding the location on Android recordings.
const GENERIC_LOCATION_TAG: &str = "location";

/// ffprobe JSON output structure (only the parts we read).
#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Probes a video file.
///
/// # Errors
///
/// Returns [`ExtractError`] if `ffprobe` fails or prints invalid JSON.
pub async fn probe(program: &str, path: &Path) -> Result<CaptureMetadata, ExtractError> {
    let stdout = crate::run_tool(
        "ffprobe",
        program,
        &[
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ],
        path,
    )
    .await?;

    parse_output(&stdout)
}

/// Interprets ffprobe's JSON output.
///
/// # Errors
///
/// Returns [`ExtractError::Parse`] if the output is not valid JSON.
pub fn parse_output(stdout: &[u8]) -> Result<CaptureMetadata, ExtractError> {
    let output: FfprobeOutput = serde_json::from_slice(stdout).map_err(|e| ExtractError::Parse {
        message: format!("invalid ffprobe output: {e}"),
    })?;
    let tags = &output.format.tags;

    let location = tags
        .get(QUICKTIME_LOCATION_TAG)
        .or_else(|| tags.get(GENERIC_LOCATION_TAG))
        .and_then(|value| iso6709::parse_location(value));

    let datetime_utc = tags
        .get("creation_time")
        .and_then(|value| DateTime::parse_from_rfc3339(value.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(CaptureMetadata {
        datetime_utc,
        latitude: location.map(|(lat, _)| lat),
        longitude: location.map(|(_, lon)| lon),
        camera_make: None,
        camera_model: None,
    })
}

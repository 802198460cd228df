//! Image metadata via `exiftool -json -n`.
//!
//! With `-n` exiftool prints GPS values as unsigned decimal degrees plus
//! `N`/`S`/`E`/`W` reference tags, and prints numeric-looking strings
//! (e.g. a camera model of `"6"`) as JSON numbers, so every field is read
//! leniently from a [`serde_json::Value`].

use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::{CaptureMetadata, ExtractError};

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const TAGS: &[&str] = &[
    "-json",
    "-n",
    "-GPSLatitude",
    "-GPSLatitudeRef",
    "-GPSLongitude",
    "-GPSLongitudeRef",
    "-DateTimeOriginal",
    "-OffsetTimeOriginal",
    "-Make",
    "-Model",
];

/// Probes an image file.
///
/// # Errors
///
/// Returns [`ExtractError`] if exiftool fails or prints unexpected output.
pub async fn probe(program: &str, path: &Path) -> Result<CaptureMetadata, ExtractError> {
    let stdout = crate::run_tool("exiftool", program, TAGS, path).await?;
    parse_output(&stdout)
}

/// Interprets exiftool's JSON output (an array with one object per file).
///
/// # Errors
///
/// Returns [`ExtractError::Parse`] if the output is not a JSON array of
/// objects.
pub fn parse_output(stdout: &[u8]) -> Result<CaptureMetadata, ExtractError> {
    let body: serde_json::Value = serde_json::from_slice(stdout).map_err(|e| ExtractError::Parse {
        message: format!("invalid exiftool output: {e}"),
    })?;

    let record = body
        .as_array()
        .and_then(|files| files.first())
        .filter(|record| record.is_object())
        .ok_or_else(|| ExtractError::Parse {
            message: "exiftool output is not an array of objects".to_string(),
        })?;

    let latitude = signed_degrees(&record["GPSLatitude"], &record["GPSLatitudeRef"], 'S');
    let longitude = signed_degrees(&record["GPSLongitude"], &record["GPSLongitudeRef"], 'W');

    let datetime_utc = text(&record["DateTimeOriginal"]).and_then(|value| {
        parse_exif_datetime(&value, text(&record["OffsetTimeOriginal"]).as_deref())
    });

    Ok(CaptureMetadata {
        datetime_utc,
        latitude,
        longitude,
        camera_make: text(&record["Make"]),
        camera_model: text(&record["Model"]),
    })
}

/// Applies the hemisphere reference to an unsigned degree value.
fn signed_degrees(
    value: &serde_json::Value,
    reference: &serde_json::Value,
    negative_ref: char,
) -> Option<f64> {
    let degrees = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))?;

    let negative = text(reference)
        .and_then(|r| r.chars().next())
        .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref));

    Some(if negative { -degrees.abs() } else { degrees })
}

/// Reads a tag as non-blank text, accepting numbers.
fn text(value: &serde_json::Value) -> Option<String> {
    let s = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

/// Parses an EXIF `YYYY:MM:DD HH:MM:SS` timestamp. Without an offset the
/// value is taken as UTC.
fn parse_exif_datetime(value: &str, offset: Option<&str>) -> Option<DateTime<Utc>> {
    // Sub-second or zone suffixes occasionally follow the 19-char stamp.
    let stamp = value.get(..19)?;
    let naive = NaiveDateTime::parse_from_str(stamp, EXIF_DATETIME_FORMAT).ok()?;

    let offset = offset.and_then(parse_offset);
    let local = match offset {
        Some(offset) => offset.from_local_datetime(&naive).single()?,
        None => Utc.from_utc_datetime(&naive).fixed_offset(),
    };
    Some(local.with_timezone(&Utc))
}

/// Parses `+HH:MM` / `-HH:MM`.
fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    let sign = match value.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let (hours, minutes) = value.get(1..)?.split_once(':')?;
    let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
    FixedOffset::east_opt(sign * seconds)
}

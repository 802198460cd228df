//! ISO 6709 location strings as written by phone cameras into video
//! metadata, e.g. `+48.8584+002.2945+035.000/`.
//!
//! Only the leading signed-decimal latitude/longitude pair is read;
//! altitude and the trailing CRS marker are ignored.

use regex::Regex;
use std::sync::LazyLock;

/// Leading `±DD.DDDD±DDD.DDDD`.
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+\-][0-9]+\.[0-9]+)([+\-][0-9]+\.[0-9]+)")
        .unwrap_or_else(|_| unreachable!())
});

/// Parses `(latitude, longitude)` from an ISO 6709 string.
#[must_use]
pub fn parse_location(value: &str) -> Option<(f64, f64)> {
    let captures = LOCATION_RE.captures(value.trim())?;
    let latitude = captures.get(1)?.as_str().parse::<f64>().ok()?;
    let longitude = captures.get(2)?.as_str().parse::<f64>().ok()?;
    Some((latitude, longitude))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_apple_location_with_altitude() {
        assert_eq!(
            parse_location("+48.8584+002.2945+035.000/"),
            Some((48.8584, 2.2945))
        );
    }

    #[test]
    fn parses_negative_components() {
        assert_eq!(
            parse_location("-33.8568+151.2153/"),
            Some((-33.8568, 151.2153))
        );
        assert_eq!(
            parse_location("+37.4219-122.0840/"),
            Some((37.4219, -122.084))
        );
    }

    #[test]
    fn rejects_unsigned_or_integer_forms() {
        assert_eq!(parse_location("48.8584+002.2945"), None);
        assert_eq!(parse_location("+48+002"), None);
        assert_eq!(parse_location(""), None);
    }
}

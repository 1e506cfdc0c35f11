//! Generic EXIF/GPS and container tags.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;

use crate::descriptor::VideoDescriptor;

use super::{
    layers::PartialMetadata,
    parse_number,
    record::{CaptureTime, GpsAltitude},
};

/// ISO 6709 point: `±DD.DDDD±DDD.DDDD[±AAA.AAA][CRS]/`.
static ISO_6709: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]\d+(?:\.\d+)?)([+-]\d+(?:\.\d+)?)([+-]\d+(?:\.\d+)?)?")
        .expect("ISO 6709 pattern is valid")
});

/// `YYYY:MM:DD HH:MM:SS[.fff][Z|±HH:MM]`, the EXIF/QuickTime date form.
static EXIF_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\d{4}):(\d{2}):(\d{2})[ T](\d{2}):(\d{2}):(\d{2})(\.\d+)?\s*(Z|[+-]\d{2}:?\d{2})?\s*$",
    )
    .expect("EXIF date pattern is valid")
});

/// Tags that may carry the recording start time, in priority order.
const BASE_TIME_TAGS: [&str; 5] = [
    "creation_time",
    "com.apple.quicktime.creationdate",
    "DateTimeOriginal",
    "CreateDate",
    "MediaCreateDate",
];

/// Tags that may carry an ISO 6709 location string.
const LOCATION_TAGS: [&str; 4] = [
    "location",
    "com.apple.quicktime.location.ISO6709",
    "GPSCoordinates",
    "location-eng",
];

/// Layer built from tags every camera may write.
pub fn exif_layer(descriptor: &VideoDescriptor) -> PartialMetadata {
    let number = |names: &[&str]| descriptor.first_tag(names).and_then(parse_number);
    let text = |name: &str| descriptor.tag(name).map(|value| value.trim().to_string());

    let (coordinates, location_altitude) = match gps_coordinates(descriptor) {
        Some(coordinates) => (Some(coordinates), None),
        None => match LOCATION_TAGS.iter().find_map(|name| descriptor.tag(name)).and_then(parse_location) {
            Some((latitude, longitude, altitude)) => {
                (Some((latitude, longitude)), altitude.map(GpsAltitude::sea_level))
            }
            None => (None, None),
        },
    };

    PartialMetadata {
        coordinates,
        altitude: gps_altitude(descriptor).or(location_altitude),
        make: text("Make"),
        model: text("Model"),
        focal_length_mm: number(&["FocalLength"]),
        focal_length_35mm: number(&["FocalLengthIn35mmFormat", "FocalLength35efl"]),
        f_number: number(&["FNumber", "Aperture"]),
        exposure_time: number(&["ExposureTime", "ShutterSpeed"]),
        ..Default::default()
    }
}

/// `GPSLatitude`/`GPSLongitude`, signed by their reference tags when present.
fn gps_coordinates(descriptor: &VideoDescriptor) -> Option<(f64, f64)> {
    let latitude = descriptor.tag("GPSLatitude").and_then(parse_number)?;
    let longitude = descriptor.tag("GPSLongitude").and_then(parse_number)?;

    let latitude = match descriptor.tag("GPSLatitudeRef").map(str::trim) {
        Some(reference) if reference.starts_with(['S', 's']) => -latitude.abs(),
        Some(_) => latitude.abs(),
        None => latitude,
    };
    let longitude = match descriptor.tag("GPSLongitudeRef").map(str::trim) {
        Some(reference) if reference.starts_with(['W', 'w']) => -longitude.abs(),
        Some(_) => longitude.abs(),
        None => longitude,
    };
    Some((latitude, longitude))
}

/// `GPSAltitude` with its reference. Without `GPSAltitudeRef` the altitude
/// is unusable and dropped.
fn gps_altitude(descriptor: &VideoDescriptor) -> Option<GpsAltitude> {
    let meters = descriptor.tag("GPSAltitude").and_then(parse_number)?;
    let reference = descriptor.tag("GPSAltitudeRef")?.trim().to_ascii_lowercase();
    let below = match reference.as_str() {
        "0" | "above sea level" => false,
        "1" | "below sea level" => true,
        _ => return None,
    };
    Some(GpsAltitude::sea_level(if below { -meters.abs() } else { meters.abs() }))
}

/// Parse an ISO 6709 string, or ExifTool's numeric `"lat lon [alt]"` form.
pub fn parse_location(value: &str) -> Option<(f64, f64, Option<f64>)> {
    if let Some(captures) = ISO_6709.captures(value) {
        let latitude = captures.get(1)?.as_str().parse().ok()?;
        let longitude = captures.get(2)?.as_str().parse().ok()?;
        let altitude = captures.get(3).and_then(|altitude| altitude.as_str().parse().ok());
        return Some((latitude, longitude, altitude));
    }

    let mut parts = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f64>());
    let latitude = parts.next()?.ok()?;
    let longitude = parts.next()?.ok()?;
    let altitude = parts.next().and_then(Result::ok);
    Some((latitude, longitude, altitude))
}

/// The recording start time, from the first tag that parses.
pub fn base_capture_time(descriptor: &VideoDescriptor) -> Option<CaptureTime> {
    BASE_TIME_TAGS
        .iter()
        .filter_map(|name| descriptor.tag(name))
        .find_map(parse_capture_time)
}

/// Parse RFC 3339 or EXIF-style timestamps. All-zero placeholder dates are
/// rejected.
pub fn parse_capture_time(value: &str) -> Option<CaptureTime> {
    let value = value.trim();
    if value.starts_with("0000") {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(CaptureTime {
            local: parsed.naive_local(),
            utc_offset_seconds: Some(parsed.offset().local_minus_utc()),
        });
    }

    let captures = EXIF_DATE.captures(value)?;
    let normalised = format!(
        "{}-{}-{} {}:{}:{}{}",
        &captures[1],
        &captures[2],
        &captures[3],
        &captures[4],
        &captures[5],
        &captures[6],
        captures.get(7).map_or("", |fraction| fraction.as_str()),
    );
    let local = NaiveDateTime::parse_from_str(&normalised, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    let utc_offset_seconds = captures.get(8).and_then(|zone| parse_zone(zone.as_str()));

    Some(CaptureTime {
        local,
        utc_offset_seconds,
    })
}

fn parse_zone(zone: &str) -> Option<i32> {
    if zone == "Z" {
        return Some(0);
    }
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone.chars().filter(char::is_ascii_digit).collect();
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..4)?.parse().ok()?;
    Some(sign * (hours * 3600 + minutes * 60))
}

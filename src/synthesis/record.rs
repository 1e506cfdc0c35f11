//! Per-frame metadata record.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::descriptor::Rotation;

/// North/south hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LatitudeRef {
    /// North of the equator.
    North,
    /// South of the equator.
    South,
}

impl LatitudeRef {
    /// EXIF reference letter.
    pub fn letter(self) -> &'static str {
        match self {
            LatitudeRef::North => "N",
            LatitudeRef::South => "S",
        }
    }
}

/// East/west hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LongitudeRef {
    /// East of the prime meridian.
    East,
    /// West of the prime meridian.
    West,
}

impl LongitudeRef {
    /// EXIF reference letter.
    pub fn letter(self) -> &'static str {
        match self {
            LongitudeRef::East => "E",
            LongitudeRef::West => "W",
        }
    }
}

/// An unsigned angle in degrees, minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dms {
    /// Whole degrees.
    pub degrees: u32,
    /// Whole minutes (0–59).
    pub minutes: u32,
    /// Seconds (0 ≤ s < 60), rounded to 1/10000.
    pub seconds: f64,
}

impl Dms {
    /// Convert the magnitude of a decimal angle.
    pub fn from_decimal(value: f64) -> Self {
        // Work in 1/10000 s so rounding can carry into minutes and degrees.
        let total = (value.abs() * 3600.0 * 10_000.0).round() as u64;
        let degrees = total / (3600 * 10_000);
        let minutes = (total / (60 * 10_000)) % 60;
        let seconds = (total % (60 * 10_000)) as f64 / 10_000.0;
        Self {
            degrees: degrees as u32,
            minutes: minutes as u32,
            seconds,
        }
    }

    /// Unsigned decimal degrees.
    pub fn to_decimal(self) -> f64 {
        f64::from(self.degrees) + f64::from(self.minutes) / 60.0 + self.seconds / 3600.0
    }

    /// ExifTool's `"D M S"` input form.
    pub fn to_exif_string(self) -> String {
        format!("{} {} {:.4}", self.degrees, self.minutes, self.seconds)
    }
}

/// What a GPS altitude is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AltitudeReference {
    /// Height above mean sea level.
    AboveSeaLevel,
    /// Depth below mean sea level.
    BelowSeaLevel,
}

/// An altitude magnitude and its reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsAltitude {
    /// Non-negative magnitude in metres.
    pub meters: f64,
    /// Reference surface.
    pub reference: AltitudeReference,
}

impl GpsAltitude {
    /// A signed altitude relative to sea level.
    pub fn sea_level(signed_meters: f64) -> Self {
        Self {
            meters: signed_meters.abs(),
            reference: if signed_meters < 0.0 {
                AltitudeReference::BelowSeaLevel
            } else {
                AltitudeReference::AboveSeaLevel
            },
        }
    }
}

/// A GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsPosition {
    /// Latitude magnitude.
    pub latitude: Dms,
    /// Latitude hemisphere.
    pub latitude_ref: LatitudeRef,
    /// Longitude magnitude.
    pub longitude: Dms,
    /// Longitude hemisphere.
    pub longitude_ref: LongitudeRef,
    /// Altitude, present only with a known reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<GpsAltitude>,
}

impl GpsPosition {
    /// Build from signed decimal degrees. Returns `None` for out-of-range
    /// coordinates and for the `0,0` placeholder some recorders write before a
    /// fix is acquired.
    pub fn from_decimal(latitude: f64, longitude: f64, altitude: Option<GpsAltitude>) -> Option<Self> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || latitude.abs() > 90.0
            || longitude.abs() > 180.0
            || (latitude == 0.0 && longitude == 0.0)
        {
            return None;
        }
        Some(Self {
            latitude: Dms::from_decimal(latitude),
            latitude_ref: if latitude < 0.0 {
                LatitudeRef::South
            } else {
                LatitudeRef::North
            },
            longitude: Dms::from_decimal(longitude),
            longitude_ref: if longitude < 0.0 {
                LongitudeRef::West
            } else {
                LongitudeRef::East
            },
            altitude,
        })
    }

    /// Signed decimal latitude.
    pub fn decimal_latitude(&self) -> f64 {
        match self.latitude_ref {
            LatitudeRef::North => self.latitude.to_decimal(),
            LatitudeRef::South => -self.latitude.to_decimal(),
        }
    }

    /// Signed decimal longitude.
    pub fn decimal_longitude(&self) -> f64 {
        match self.longitude_ref {
            LongitudeRef::East => self.longitude.to_decimal(),
            LongitudeRef::West => -self.longitude.to_decimal(),
        }
    }
}

/// Camera gimbal orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GimbalOrientation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
}

/// Aircraft telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FlightTelemetry {
    /// Ground speed in m/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Height above take-off in metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_altitude: Option<f64>,
    /// Horizontal distance from the home point in metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_from_home: Option<f64>,
}

/// Optics and sensor size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SensorGeometry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length_35mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f_number: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_width_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_height_mm: Option<f64>,
}

/// Camera identity and exposure.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CameraInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Exposure time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,
}

/// A wall-clock capture time with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureTime {
    /// Local date and time.
    pub local: NaiveDateTime,
    /// Offset of `local` from UTC, when the source recorded one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_offset_seconds: Option<i32>,
}

impl CaptureTime {
    /// `YYYY:MM:DD HH:MM:SS`, the EXIF date form.
    pub fn exif_datetime(&self) -> String {
        self.local.format("%Y:%m:%d %H:%M:%S").to_string()
    }

    /// Milliseconds as a three-digit string, for `SubSecTime*` tags.
    pub fn exif_subseconds(&self) -> String {
        self.local.format("%3f").to_string()
    }

    /// `+HH:MM`, for `OffsetTime*` tags.
    pub fn exif_offset(&self) -> Option<String> {
        self.utc_offset_seconds.map(|offset| {
            let sign = if offset < 0 { '-' } else { '+' };
            let minutes = offset.unsigned_abs() / 60;
            format!("{sign}{:02}:{:02}", minutes / 60, minutes % 60)
        })
    }
}

/// Everything known about one extracted frame.
///
/// Optional fields are present only when a source exposed them; nothing is
/// guessed except sensor size, which is derived from the focal lengths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameMetadataRecord {
    /// Index of the frame in the video.
    pub frame_index: u64,
    /// Seconds from the start of the recording.
    pub offset_seconds: f64,
    /// Seconds from the start of the selection window.
    pub window_offset_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_time: Option<CaptureTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gimbal: Option<GimbalOrientation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight: Option<FlightTelemetry>,
    pub sensor: SensorGeometry,
    pub camera: CameraInfo,
    /// Image width after rotation.
    pub width: u32,
    /// Image height after rotation.
    pub height: u32,
    /// Rotation applied to the pixels.
    pub rotation: Rotation,
    /// Telemetry schema that supplied vendor data (`"dji"`, `"parrot"`,
    /// `"generic"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn dms_carries_rounding_into_minutes() {
        let dms = Dms::from_decimal(10.999_999_99);
        assert_eq!((dms.degrees, dms.minutes), (11, 0));
        assert_eq!(dms.seconds, 0.0);
    }

    #[test]
    fn dms_of_negative_value_is_magnitude() {
        let dms = Dms::from_decimal(-122.4194);
        assert_eq!((dms.degrees, dms.minutes), (122, 25));
        assert!((dms.seconds - 9.84).abs() < 1e-9);
    }

    #[test]
    fn position_assigns_hemispheres() {
        let position = GpsPosition::from_decimal(-33.8688, 151.2093, None).unwrap();
        assert_eq!(position.latitude_ref, LatitudeRef::South);
        assert_eq!(position.longitude_ref, LongitudeRef::East);
        assert!((position.decimal_latitude() + 33.8688).abs() < 1e-6);
    }

    #[test]
    fn placeholder_and_out_of_range_positions_are_rejected() {
        assert!(GpsPosition::from_decimal(0.0, 0.0, None).is_none());
        assert!(GpsPosition::from_decimal(91.0, 10.0, None).is_none());
    }

    #[test]
    fn sea_level_altitude_takes_reference_from_sign() {
        assert_eq!(
            GpsAltitude::sea_level(-12.5),
            GpsAltitude {
                meters: 12.5,
                reference: AltitudeReference::BelowSeaLevel
            }
        );
    }

    #[test]
    fn capture_time_formats_for_exif() {
        let local = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 45, 67)
            .unwrap();
        let time = CaptureTime {
            local,
            utc_offset_seconds: Some(-(5 * 3600 + 30 * 60)),
        };
        assert_eq!(time.exif_datetime(), "2024:05:01 12:30:45");
        assert_eq!(time.exif_subseconds(), "067");
        assert_eq!(time.exif_offset().as_deref(), Some("-05:30"));
    }
}

//! Per-frame metadata synthesis.
//!
//! The [`Synthesizer`] builds a [`FrameMetadataRecord`] for each selected
//! frame by merging metadata layers, most specific first:
//!
//! 0. a manual rotation override,
//! 1. vendor telemetry from the first matching [`TelemetryExtractor`], then
//!    the generic telemetry fallback,
//! 2. general EXIF/GPS and container tags,
//! 3. stream parameters from the prober,
//! 4. computed defaults (sensor size from the crop factor).
//!
//! A field keeps the first value any layer supplies. Synthesis is a pure
//! function of the descriptor, the frame and the synthesizer's settings, so
//! repeated runs produce identical records.
//!
//! # Example
//!
//! ```no_run
//! use vidmesh::{FfmpegProber, SamplingPolicy, Synthesizer, VideoProber, select_frames};
//!
//! let descriptor = FfmpegProber::new().describe(std::path::Path::new("flight.mp4"))?;
//! let selection = select_frames(&descriptor, &SamplingPolicy::every(30), None)?;
//! let synthesizer = Synthesizer::new();
//! for frame in &selection.frames {
//!     let record = synthesizer.synthesize(&descriptor, frame)?;
//!     println!("{}", serde_json::to_string(&record).unwrap());
//! }
//! # Ok::<(), vidmesh::VidmeshError>(())
//! ```

mod exif;
mod layers;
mod record;
mod sensor;
mod telemetry;

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    time::Duration,
};

use chrono::{DurationRound, TimeDelta};

pub use exif::{base_capture_time, exif_layer, parse_capture_time, parse_location};
pub use layers::PartialMetadata;
pub use record::{
    AltitudeReference, CameraInfo, CaptureTime, Dms, FlightTelemetry, FrameMetadataRecord,
    GimbalOrientation, GpsAltitude, GpsPosition, LatitudeRef, LongitudeRef, SensorGeometry,
};
pub use sensor::{FULL_FRAME_DIAGONAL_MM, KNOWN_SENSORS, SensorFormat, known_sensor, sensor_dimensions};
pub use telemetry::{
    DjiTelemetry, GenericTelemetry, ParrotTelemetry, TelemetryExtractor, default_extractors,
};

use crate::{
    descriptor::{Rotation, VideoDescriptor},
    error::VidmeshError,
    selection::SelectedFrame,
};

/// What to do when the video has no recorded start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPolicy {
    /// Leave `capture_time` empty; the offset is still recorded.
    #[default]
    OmitWhenMissing,
    /// Fail with [`VidmeshError::MissingBaseTime`].
    Require,
}

/// Builds [`FrameMetadataRecord`]s.
pub struct Synthesizer {
    rotation_override: Option<Rotation>,
    timestamp_policy: TimestampPolicy,
    window_start: Duration,
    extractors: Vec<Box<dyn TelemetryExtractor>>,
    generic: GenericTelemetry,
}

impl Synthesizer {
    /// A synthesizer with the DJI and Parrot schemas and no overrides.
    pub fn new() -> Self {
        Self {
            rotation_override: None,
            timestamp_policy: TimestampPolicy::default(),
            window_start: Duration::ZERO,
            extractors: default_extractors(),
            generic: GenericTelemetry,
        }
    }

    /// Force a rotation regardless of what the stream reports.
    #[must_use]
    pub fn with_rotation_override(mut self, rotation: Option<Rotation>) -> Self {
        self.rotation_override = rotation;
        self
    }

    /// Set the missing-base-time behaviour.
    #[must_use]
    pub fn with_timestamp_policy(mut self, policy: TimestampPolicy) -> Self {
        self.timestamp_policy = policy;
        self
    }

    /// Start of the selection window, for `window_offset_seconds`.
    #[must_use]
    pub fn with_window_start(mut self, start: Duration) -> Self {
        self.window_start = start;
        self
    }

    /// Replace the vendor schemas. They are tried in order.
    #[must_use]
    pub fn with_extractors(mut self, extractors: Vec<Box<dyn TelemetryExtractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    /// The vendor schema that matches `descriptor`, if any.
    pub fn vendor_for(&self, descriptor: &VideoDescriptor) -> Option<&'static str> {
        self.extractors
            .iter()
            .find(|extractor| extractor.matches(descriptor))
            .map(|extractor| extractor.vendor())
    }

    /// Build the record for one frame.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::MissingBaseTime`] under
    /// [`TimestampPolicy::Require`] when no start time is recorded.
    pub fn synthesize(
        &self,
        descriptor: &VideoDescriptor,
        frame: &SelectedFrame,
    ) -> Result<FrameMetadataRecord, VidmeshError> {
        let override_layer = PartialMetadata {
            rotation: self.rotation_override,
            ..Default::default()
        };

        let vendor_layer = self
            .extractors
            .iter()
            .find(|extractor| extractor.matches(descriptor))
            .map(|extractor| extractor.extract(descriptor, frame))
            .unwrap_or_default();
        let telemetry_layer = vendor_layer.or(self.generic.extract(descriptor, frame));

        let stream_layer = PartialMetadata {
            rotation: Some(descriptor.rotation),
            ..Default::default()
        };

        let merged = PartialMetadata::merge([
            override_layer,
            telemetry_layer,
            exif_layer(descriptor),
            stream_layer,
        ]);

        let rotation = merged.rotation.unwrap_or_default();
        let (width, height) = descriptor.display_dimensions(rotation);
        let defaults = sensor::sensor_layer(&merged, width, height);
        let merged = merged.or(defaults);

        let capture_time = match base_capture_time(descriptor) {
            Some(base) => Some(offset_capture_time(base, frame.timestamp)),
            None if self.timestamp_policy == TimestampPolicy::Require => {
                return Err(VidmeshError::MissingBaseTime {
                    path: descriptor.path.clone(),
                });
            }
            None => None,
        };

        Ok(build_record(
            merged,
            frame,
            self.window_start,
            capture_time,
            (width, height),
            rotation,
        ))
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Synthesizer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Synthesizer")
            .field("rotation_override", &self.rotation_override)
            .field("timestamp_policy", &self.timestamp_policy)
            .field("window_start", &self.window_start)
            .field(
                "extractors",
                &self
                    .extractors
                    .iter()
                    .map(|extractor| extractor.vendor())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// `base + offset`, rounded to the millisecond.
fn offset_capture_time(base: CaptureTime, offset_seconds: f64) -> CaptureTime {
    let millis = (offset_seconds * 1000.0).round() as i64;
    let local = base.local + TimeDelta::milliseconds(millis);
    CaptureTime {
        local: local
            .duration_round(TimeDelta::milliseconds(1))
            .unwrap_or(local),
        utc_offset_seconds: base.utc_offset_seconds,
    }
}

fn build_record(
    merged: PartialMetadata,
    frame: &SelectedFrame,
    window_start: Duration,
    capture_time: Option<CaptureTime>,
    (width, height): (u32, u32),
    rotation: Rotation,
) -> FrameMetadataRecord {
    let gps = merged
        .coordinates
        .and_then(|(latitude, longitude)| GpsPosition::from_decimal(latitude, longitude, merged.altitude));

    let gimbal = GimbalOrientation {
        pitch: merged.gimbal_pitch,
        roll: merged.gimbal_roll,
        yaw: merged.gimbal_yaw,
    };
    let flight = FlightTelemetry {
        speed: merged.speed,
        relative_altitude: merged.relative_altitude,
        distance_from_home: merged.distance_from_home,
    };

    FrameMetadataRecord {
        frame_index: frame.index,
        offset_seconds: round_micros(frame.timestamp),
        window_offset_seconds: round_micros(frame.timestamp - window_start.as_secs_f64()),
        capture_time,
        gps,
        gimbal: (gimbal != GimbalOrientation::default()).then_some(gimbal),
        flight: (flight != FlightTelemetry::default()).then_some(flight),
        sensor: SensorGeometry {
            focal_length_mm: merged.focal_length_mm,
            focal_length_35mm: merged.focal_length_35mm,
            f_number: merged.f_number,
            sensor_width_mm: merged.sensor_width_mm,
            sensor_height_mm: merged.sensor_height_mm,
        },
        camera: CameraInfo {
            make: merged.make,
            model: merged.model,
            exposure_time: merged.exposure_time,
        },
        width,
        height,
        rotation,
        vendor: merged.vendor,
    }
}

fn round_micros(seconds: f64) -> f64 {
    (seconds * 1_000_000.0).round() / 1_000_000.0
}

/// Parse a numeric tag value.
///
/// Accepts plain numbers, fractions (`1/200`), and values with a trailing unit
/// (`4.5 mm`, `+12.0 m`).
pub(crate) fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(number) = value.parse::<f64>() {
        return number.is_finite().then_some(number);
    }
    if let Some((numerator, denominator)) = value.split_once('/') {
        let numerator: f64 = numerator.trim().parse().ok()?;
        let denominator: f64 = denominator.trim().parse().ok()?;
        return (denominator != 0.0).then(|| numerator / denominator);
    }

    let numeric_end = value
        .char_indices()
        .find(|&(index, c)| {
            !(c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && index == 0))
        })
        .map_or(value.len(), |(index, _)| index);
    value[..numeric_end]
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

//! Vendor telemetry schemas.
//!
//! Drone recorders embed flight data under vendor-specific tag groups. Each
//! schema is a [`TelemetryExtractor`]; the synthesizer asks each in turn
//! whether it recognises the video and uses the first that does, then falls
//! back to [`GenericTelemetry`] for fields the vendor schema left empty.

use crate::{descriptor::VideoDescriptor, selection::SelectedFrame};

use super::{
    layers::PartialMetadata,
    parse_number,
    record::GpsAltitude,
};

/// Reads one vendor's telemetry tags.
pub trait TelemetryExtractor: Send + Sync {
    /// Schema name recorded in [`FrameMetadataRecord::vendor`](super::FrameMetadataRecord).
    fn vendor(&self) -> &'static str;

    /// Whether the video carries this vendor's tags.
    fn matches(&self, descriptor: &VideoDescriptor) -> bool;

    /// Telemetry for one frame.
    fn extract(&self, descriptor: &VideoDescriptor, frame: &SelectedFrame) -> PartialMetadata;
}

fn make_is(descriptor: &VideoDescriptor, vendor: &str) -> bool {
    descriptor
        .tag("Make")
        .is_some_and(|make| make.trim().to_ascii_lowercase().starts_with(vendor))
}

fn number(descriptor: &VideoDescriptor, group: &str, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|name| descriptor.group_tag(group, name))
        .and_then(parse_number)
}

fn coordinates(descriptor: &VideoDescriptor, group: &str) -> Option<(f64, f64)> {
    let latitude = number(descriptor, group, &["GPSLatitude", "Latitude"])?;
    let longitude = number(descriptor, group, &["GPSLongitude", "Longitude"])?;
    Some((latitude, longitude))
}

/// Name `vendor` as the source of `layer`, if it supplied any telemetry.
fn with_vendor(mut layer: PartialMetadata, vendor: &str) -> PartialMetadata {
    if layer.has_telemetry() {
        layer.vendor = Some(vendor.to_string());
    }
    layer
}

/// DJI aircraft (`DJI` / `XMP-drone-dji` groups).
#[derive(Debug, Clone, Copy, Default)]
pub struct DjiTelemetry;

impl TelemetryExtractor for DjiTelemetry {
    fn vendor(&self) -> &'static str {
        "dji"
    }

    fn matches(&self, descriptor: &VideoDescriptor) -> bool {
        descriptor.has_group("dji") || make_is(descriptor, "dji")
    }

    fn extract(&self, descriptor: &VideoDescriptor, _frame: &SelectedFrame) -> PartialMetadata {
        let group = "dji";
        let speed = match (
            number(descriptor, group, &["FlightXSpeed", "SpeedX"]),
            number(descriptor, group, &["FlightYSpeed", "SpeedY"]),
        ) {
            (Some(x), Some(y)) => {
                let z = number(descriptor, group, &["FlightZSpeed", "SpeedZ"]).unwrap_or(0.0);
                Some((x * x + y * y + z * z).sqrt())
            }
            _ => None,
        };

        let layer = PartialMetadata {
            coordinates: coordinates(descriptor, group),
            altitude: number(descriptor, group, &["AbsoluteAltitude"]).map(GpsAltitude::sea_level),
            gimbal_pitch: number(descriptor, group, &["GimbalPitchDegree", "GimbalPitch"]),
            gimbal_roll: number(descriptor, group, &["GimbalRollDegree", "GimbalRoll"]),
            gimbal_yaw: number(descriptor, group, &["GimbalYawDegree", "GimbalYaw"]),
            speed,
            relative_altitude: number(descriptor, group, &["RelativeAltitude"]),
            distance_from_home: number(descriptor, group, &["DistanceFromHome", "HomeDistance"]),
            ..Default::default()
        };
        with_vendor(layer, self.vendor())
    }
}

/// Parrot aircraft (`Parrot` group).
#[derive(Debug, Clone, Copy, Default)]
pub struct ParrotTelemetry;

impl TelemetryExtractor for ParrotTelemetry {
    fn vendor(&self) -> &'static str {
        "parrot"
    }

    fn matches(&self, descriptor: &VideoDescriptor) -> bool {
        descriptor.has_group("parrot") || make_is(descriptor, "parrot")
    }

    fn extract(&self, descriptor: &VideoDescriptor, _frame: &SelectedFrame) -> PartialMetadata {
        let group = "parrot";
        let layer = PartialMetadata {
            coordinates: coordinates(descriptor, group),
            // Parrot's GPSAltitude is the WGS84 fix; Altitude is above take-off.
            altitude: number(descriptor, group, &["GPSAltitude"]).map(GpsAltitude::sea_level),
            gimbal_pitch: number(descriptor, group, &["CameraTilt", "GimbalPitch"]),
            gimbal_roll: number(descriptor, group, &["CameraRoll", "GimbalRoll"]),
            gimbal_yaw: number(descriptor, group, &["CameraPan", "GimbalYaw"]),
            speed: number(descriptor, group, &["GPSSpeed", "Speed"]),
            relative_altitude: number(descriptor, group, &["Altitude", "AltitudeAGL"]),
            distance_from_home: number(descriptor, group, &["DistanceFromHome"]),
            ..Default::default()
        };
        with_vendor(layer, self.vendor())
    }
}

/// Telemetry tags recognised in any group.
///
/// Only fields with unambiguous names are read; the vendor is recorded as
/// `"generic"` when at least one is found.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericTelemetry;

impl GenericTelemetry {
    fn value(descriptor: &VideoDescriptor, names: &[&str]) -> Option<f64> {
        descriptor.first_tag(names).and_then(parse_number)
    }
}

impl TelemetryExtractor for GenericTelemetry {
    fn vendor(&self) -> &'static str {
        "generic"
    }

    fn matches(&self, _descriptor: &VideoDescriptor) -> bool {
        true
    }

    fn extract(&self, descriptor: &VideoDescriptor, _frame: &SelectedFrame) -> PartialMetadata {
        let layer = PartialMetadata {
            gimbal_pitch: Self::value(descriptor, &["GimbalPitchDegree", "GimbalPitch"]),
            gimbal_roll: Self::value(descriptor, &["GimbalRollDegree", "GimbalRoll"]),
            gimbal_yaw: Self::value(descriptor, &["GimbalYawDegree", "GimbalYaw"]),
            speed: Self::value(descriptor, &["FlightSpeed"]),
            relative_altitude: Self::value(descriptor, &["RelativeAltitude"]),
            distance_from_home: Self::value(descriptor, &["DistanceFromHome"]),
            ..Default::default()
        };
        with_vendor(layer, self.vendor())
    }
}

/// The vendor schemas tried before the generic fallback, in order.
pub fn default_extractors() -> Vec<Box<dyn TelemetryExtractor>> {
    vec![Box::new(DjiTelemetry), Box::new(ParrotTelemetry)]
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, path::PathBuf, time::Duration};

    use super::*;
    use crate::{descriptor::Rotation, synthesis::record::AltitudeReference};

    fn descriptor(tags: &[(&str, &str)]) -> VideoDescriptor {
        VideoDescriptor {
            path: PathBuf::from("flight.mp4"),
            duration: Duration::from_secs(60),
            frames_per_second: 30.0,
            frame_count: 1800,
            width: 3840,
            height: 2160,
            rotation: Rotation::None,
            codec: "h264".into(),
            format: "mp4".into(),
            tags: tags
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    const FRAME: SelectedFrame = SelectedFrame {
        index: 0,
        timestamp: 0.0,
    };

    #[test]
    fn dji_reads_absolute_and_relative_altitude_separately() {
        let video = descriptor(&[
            ("DJI:GPSLatitude", "47.3977"),
            ("DJI:GPSLongitude", "8.5456"),
            ("DJI:AbsoluteAltitude", "-3.5"),
            ("DJI:RelativeAltitude", "42.0"),
            ("DJI:GimbalPitchDegree", "-90.0"),
            ("DJI:FlightXSpeed", "3"),
            ("DJI:FlightYSpeed", "4"),
        ]);
        assert!(DjiTelemetry.matches(&video));

        let layer = DjiTelemetry.extract(&video, &FRAME);
        assert_eq!(layer.coordinates, Some((47.3977, 8.5456)));
        assert_eq!(
            layer.altitude.map(|altitude| altitude.reference),
            Some(AltitudeReference::BelowSeaLevel)
        );
        assert_eq!(layer.relative_altitude, Some(42.0));
        assert_eq!(layer.gimbal_pitch, Some(-90.0));
        assert_eq!(layer.speed, Some(5.0));
    }

    #[test]
    fn make_alone_does_not_name_a_vendor() {
        let video = descriptor(&[("QuickTime:Make", "DJI"), ("QuickTime:Model", "FC3582")]);
        assert!(DjiTelemetry.matches(&video));

        let layer = DjiTelemetry.extract(&video, &FRAME);
        assert!(!layer.has_telemetry());
        assert_eq!(layer.vendor, None);
    }

    #[test]
    fn parrot_is_matched_by_make() {
        let video = descriptor(&[("QuickTime:Make", "Parrot"), ("Parrot:CameraTilt", "-45")]);
        assert!(ParrotTelemetry.matches(&video));
        assert!(!DjiTelemetry.matches(&video));
        assert_eq!(ParrotTelemetry.extract(&video, &FRAME).gimbal_pitch, Some(-45.0));
    }

    #[test]
    fn generic_sets_vendor_only_when_something_was_found() {
        let empty = descriptor(&[("QuickTime:Make", "Acme")]);
        assert_eq!(GenericTelemetry.extract(&empty, &FRAME).vendor, None);

        let with_gimbal = descriptor(&[("XMP-camera:GimbalYawDegree", "12.5")]);
        let layer = GenericTelemetry.extract(&with_gimbal, &FRAME);
        assert_eq!(layer.vendor.as_deref(), Some("generic"));
        assert_eq!(layer.gimbal_yaw, Some(12.5));
    }
}

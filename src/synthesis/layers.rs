//! Layered metadata merging.
//!
//! Each metadata source produces a [`PartialMetadata`]. Layers are combined
//! with [`PartialMetadata::or`], most specific first, so a field keeps the
//! first value any layer supplied.

use crate::descriptor::Rotation;

use super::record::GpsAltitude;

/// Metadata fields supplied by one source. Every field is optional.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartialMetadata {
    /// Telemetry schema name.
    pub vendor: Option<String>,
    /// Signed decimal `(latitude, longitude)`, kept together so one fix is
    /// never mixed with another.
    pub coordinates: Option<(f64, f64)>,
    /// GPS altitude with its sea-level reference.
    pub altitude: Option<GpsAltitude>,
    /// Gimbal pitch in degrees.
    pub gimbal_pitch: Option<f64>,
    /// Gimbal roll in degrees.
    pub gimbal_roll: Option<f64>,
    /// Gimbal yaw in degrees.
    pub gimbal_yaw: Option<f64>,
    /// Ground speed in m/s.
    pub speed: Option<f64>,
    /// Height above take-off in metres.
    pub relative_altitude: Option<f64>,
    /// Distance from the home point in metres.
    pub distance_from_home: Option<f64>,
    /// Actual focal length in millimetres.
    pub focal_length_mm: Option<f64>,
    /// 35 mm equivalent focal length.
    pub focal_length_35mm: Option<f64>,
    /// Aperture as an f-number.
    pub f_number: Option<f64>,
    /// Sensor width in millimetres.
    pub sensor_width_mm: Option<f64>,
    /// Sensor height in millimetres.
    pub sensor_height_mm: Option<f64>,
    /// Camera manufacturer.
    pub make: Option<String>,
    /// Camera model.
    pub model: Option<String>,
    /// Exposure time in seconds.
    pub exposure_time: Option<f64>,
    /// Rotation applied to the frames.
    pub rotation: Option<Rotation>,
}

impl PartialMetadata {
    /// Fill every field `self` lacks from `fallback`.
    #[must_use]
    pub fn or(self, fallback: PartialMetadata) -> PartialMetadata {
        PartialMetadata {
            vendor: self.vendor.or(fallback.vendor),
            coordinates: self.coordinates.or(fallback.coordinates),
            altitude: self.altitude.or(fallback.altitude),
            gimbal_pitch: self.gimbal_pitch.or(fallback.gimbal_pitch),
            gimbal_roll: self.gimbal_roll.or(fallback.gimbal_roll),
            gimbal_yaw: self.gimbal_yaw.or(fallback.gimbal_yaw),
            speed: self.speed.or(fallback.speed),
            relative_altitude: self.relative_altitude.or(fallback.relative_altitude),
            distance_from_home: self.distance_from_home.or(fallback.distance_from_home),
            focal_length_mm: self.focal_length_mm.or(fallback.focal_length_mm),
            focal_length_35mm: self.focal_length_35mm.or(fallback.focal_length_35mm),
            f_number: self.f_number.or(fallback.f_number),
            sensor_width_mm: self.sensor_width_mm.or(fallback.sensor_width_mm),
            sensor_height_mm: self.sensor_height_mm.or(fallback.sensor_height_mm),
            make: self.make.or(fallback.make),
            model: self.model.or(fallback.model),
            exposure_time: self.exposure_time.or(fallback.exposure_time),
            rotation: self.rotation.or(fallback.rotation),
        }
    }

    /// Merge layers in precedence order.
    pub fn merge<I>(layers: I) -> PartialMetadata
    where
        I: IntoIterator<Item = PartialMetadata>,
    {
        layers
            .into_iter()
            .fold(PartialMetadata::default(), PartialMetadata::or)
    }

    /// Whether any telemetry field (position, gimbal, flight) is set.
    pub fn has_telemetry(&self) -> bool {
        self.coordinates.is_some()
            || self.altitude.is_some()
            || self.gimbal_pitch.is_some()
            || self.gimbal_roll.is_some()
            || self.gimbal_yaw.is_some()
            || self.speed.is_some()
            || self.relative_altitude.is_some()
            || self.distance_from_home.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_layer_wins_per_field() {
        let vendor = PartialMetadata {
            coordinates: Some((1.0, 2.0)),
            ..Default::default()
        };
        let exif = PartialMetadata {
            coordinates: Some((3.0, 4.0)),
            make: Some("Acme".into()),
            ..Default::default()
        };

        let merged = PartialMetadata::merge([vendor, exif]);
        assert_eq!(merged.coordinates, Some((1.0, 2.0)));
        assert_eq!(merged.make.as_deref(), Some("Acme"));
    }

    #[test]
    fn empty_layers_merge_to_default() {
        assert_eq!(
            PartialMetadata::merge(Vec::<PartialMetadata>::new()),
            PartialMetadata::default()
        );
    }
}

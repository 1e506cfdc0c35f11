//! Sensor size estimation.
//!
//! Reconstruction needs the physical sensor width. Video rarely records it,
//! but the crop factor (`focal_35mm / focal`) identifies the sensor format
//! well enough. Known formats come from a table; anything else is derived
//! from the 35 mm diagonal.

use super::layers::PartialMetadata;

/// Diagonal of a 36×24 mm full-frame sensor.
pub const FULL_FRAME_DIAGONAL_MM: f64 = 43.27;

/// Relative crop-factor distance within which a table entry is used.
const MATCH_TOLERANCE: f64 = 0.04;

/// A sensor format, landscape orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFormat {
    /// Common name of the format.
    pub name: &'static str,
    /// Sensor width in millimetres.
    pub width_mm: f64,
    /// Sensor height in millimetres.
    pub height_mm: f64,
}

impl SensorFormat {
    /// Crop factor relative to full frame.
    pub fn crop_factor(&self) -> f64 {
        FULL_FRAME_DIAGONAL_MM / self.width_mm.hypot(self.height_mm)
    }
}

/// Common sensor formats, largest first.
pub const KNOWN_SENSORS: [SensorFormat; 9] = [
    SensorFormat { name: "full frame", width_mm: 36.0, height_mm: 24.0 },
    SensorFormat { name: "APS-C", width_mm: 23.5, height_mm: 15.6 },
    SensorFormat { name: "APS-C (Canon)", width_mm: 22.3, height_mm: 14.9 },
    SensorFormat { name: "Four Thirds", width_mm: 17.3, height_mm: 13.0 },
    SensorFormat { name: "1\"", width_mm: 13.2, height_mm: 8.8 },
    SensorFormat { name: "1/1.3\"", width_mm: 9.6, height_mm: 7.2 },
    SensorFormat { name: "1/1.7\"", width_mm: 7.6, height_mm: 5.7 },
    SensorFormat { name: "1/2.3\"", width_mm: 6.17, height_mm: 4.55 },
    SensorFormat { name: "1/2.8\"", width_mm: 5.6, height_mm: 3.1 },
];

/// The table entry whose crop factor is closest to `crop`, if close enough.
pub fn known_sensor(crop: f64) -> Option<&'static SensorFormat> {
    KNOWN_SENSORS
        .iter()
        .map(|sensor| (sensor, (sensor.crop_factor() - crop).abs() / crop))
        .filter(|(_, distance)| *distance <= MATCH_TOLERANCE)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(sensor, _)| sensor)
}

/// Sensor `(width, height)` in millimetres for a crop factor and an image of
/// `width`×`height` pixels.
///
/// The result is oriented like the image: a portrait image gets a portrait
/// sensor.
pub fn sensor_dimensions(crop: f64, width: u32, height: u32) -> Option<(f64, f64)> {
    if !crop.is_finite() || crop <= 0.0 || width == 0 || height == 0 {
        return None;
    }

    let (long, short) = match known_sensor(crop) {
        Some(sensor) => (sensor.width_mm, sensor.height_mm),
        None => {
            let diagonal = FULL_FRAME_DIAGONAL_MM / crop;
            let (long_px, short_px) = (f64::from(width.max(height)), f64::from(width.min(height)));
            let pixels_diagonal = long_px.hypot(short_px);
            (diagonal * long_px / pixels_diagonal, diagonal * short_px / pixels_diagonal)
        }
    };

    Some(if width >= height { (long, short) } else { (short, long) })
}

/// Computed-defaults layer: sensor size from whatever focal lengths the
/// earlier layers found.
pub fn sensor_layer(merged: &PartialMetadata, width: u32, height: u32) -> PartialMetadata {
    let crop = match (merged.focal_length_mm, merged.focal_length_35mm) {
        (Some(focal), Some(focal_35mm)) if focal > 0.0 => focal_35mm / focal,
        _ => return PartialMetadata::default(),
    };

    match sensor_dimensions(crop, width, height) {
        Some((sensor_width, sensor_height)) => PartialMetadata {
            sensor_width_mm: Some(round_to(sensor_width, 3)),
            sensor_height_mm: Some(round_to(sensor_height, 3)),
            ..Default::default()
        },
        None => PartialMetadata::default(),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_inch_sensor_is_recognised() {
        // 8.8 mm lens, 24 mm equivalent: crop 2.73.
        let sensor = known_sensor(24.0 / 8.8).unwrap();
        assert_eq!(sensor.name, "1\"");
    }

    #[test]
    fn unknown_crop_uses_diagonal_split_by_aspect() {
        let (width, height) = sensor_dimensions(10.0, 1600, 1200).unwrap();
        assert!((width - 3.4616).abs() < 1e-3);
        assert!((height - 2.5962).abs() < 1e-3);
        assert!((width.hypot(height) - 4.327).abs() < 1e-9);
    }

    #[test]
    fn portrait_image_gets_portrait_sensor() {
        let (width, height) = sensor_dimensions(1.0, 1080, 1920).unwrap();
        assert_eq!((width, height), (24.0, 36.0));
    }

    #[test]
    fn layer_needs_both_focal_lengths() {
        let only_focal = PartialMetadata {
            focal_length_mm: Some(4.5),
            ..Default::default()
        };
        assert_eq!(sensor_layer(&only_focal, 1920, 1080), PartialMetadata::default());
    }
}

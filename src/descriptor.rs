//! Video descriptor types.
//!
//! A [`VideoDescriptor`] is produced once per run by a
//! [`VideoProber`](crate::VideoProber) and is read-only afterwards. Every
//! later stage (selection, extraction, metadata synthesis) works from it
//! instead of going back to the file.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::VidmeshError;

/// A clockwise quarter-turn rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation.
    #[default]
    None,
    /// 90° clockwise.
    Clockwise90,
    /// 180°.
    Clockwise180,
    /// 270° clockwise (90° counter-clockwise).
    Clockwise270,
}

impl Rotation {
    /// Build a rotation from a clockwise angle in degrees.
    ///
    /// Negative and >360 values are normalised. Returns `None` for angles
    /// that are not a multiple of 90.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Clockwise180),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    /// Clockwise angle in degrees (0, 90, 180 or 270).
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    /// Whether applying this rotation swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Clockwise90 | Rotation::Clockwise270)
    }

    /// Dimensions of a `width`×`height` frame after rotation.
    pub fn rotated_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Rotate an image by this amount.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => image,
            Rotation::Clockwise90 => image.rotate90(),
            Rotation::Clockwise180 => image.rotate180(),
            Rotation::Clockwise270 => image.rotate270(),
        }
    }
}

impl Display for Rotation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}°", self.degrees())
    }
}

/// How the rotation of extracted frames is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationChoice {
    /// Use the rotation detected in the stream.
    #[default]
    Auto,
    /// Always use this rotation, whatever the stream says.
    Fixed(Rotation),
}

impl RotationChoice {
    /// Resolve against the detected rotation. A manual choice always wins.
    pub fn resolve(self, detected: Rotation) -> Rotation {
        match self {
            RotationChoice::Auto => detected,
            RotationChoice::Fixed(rotation) => rotation,
        }
    }

    /// The manual override, if any.
    pub fn manual(self) -> Option<Rotation> {
        match self {
            RotationChoice::Auto => None,
            RotationChoice::Fixed(rotation) => Some(rotation),
        }
    }
}

impl FromStr for RotationChoice {
    type Err = VidmeshError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(RotationChoice::Auto);
        }
        match trimmed {
            "0" | "90" | "180" | "270" => {}
            other => {
                return Err(VidmeshError::Config(format!(
                    "rotation must be one of 0, 90, 180, 270, auto (got {other})"
                )));
            }
        }
        trimmed
            .parse::<i64>()
            .ok()
            .and_then(Rotation::from_degrees)
            .map(RotationChoice::Fixed)
            .ok_or_else(|| VidmeshError::Config(format!("invalid rotation: {trimmed}")))
    }
}

/// Immutable summary of one input video.
///
/// `tags` holds every raw tag the prober saw, keyed by its name. Container
/// tags from FFmpeg use their plain names (`creation_time`, `location`);
/// tags read by ExifTool are grouped (`XMP-drone-dji:GimbalPitchDegree`).
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoDescriptor {
    /// Path of the probed file.
    pub path: PathBuf,
    /// Total duration.
    pub duration: Duration,
    /// Frames per second (average for variable-rate content).
    pub frames_per_second: f64,
    /// Number of decodable frames, as reported or estimated.
    pub frame_count: u64,
    /// Coded width in pixels, before rotation.
    pub width: u32,
    /// Coded height in pixels, before rotation.
    pub height: u32,
    /// Rotation the stream asks players to apply.
    pub rotation: Rotation,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format: String,
    /// Raw tag values keyed by tag name.
    pub tags: BTreeMap<String, String>,
}

impl VideoDescriptor {
    /// Look up a tag by name in any group.
    ///
    /// `name` matches either the full key or the part after the last `:`,
    /// case-insensitively. Keys are searched in sorted order so the result is
    /// stable.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name) || tag_name(key).eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    /// Look up the first of several candidate tag names.
    pub fn first_tag(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.tag(name))
    }

    /// Look up a tag whose group contains `group` (case-insensitive).
    pub fn group_tag(&self, group: &str, name: &str) -> Option<&str> {
        let group = group.to_ascii_lowercase();
        self.tags
            .iter()
            .find(|(key, _)| {
                key.rsplit_once(':').is_some_and(|(key_group, key_name)| {
                    key_group.to_ascii_lowercase().contains(&group)
                        && key_name.eq_ignore_ascii_case(name)
                })
            })
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    /// Whether any tag group contains `group` (case-insensitive).
    pub fn has_group(&self, group: &str) -> bool {
        let group = group.to_ascii_lowercase();
        self.tags.keys().any(|key| {
            key.rsplit_once(':')
                .is_some_and(|(key_group, _)| key_group.to_ascii_lowercase().contains(&group))
        })
    }

    /// Presentation time of a frame in seconds from the start of the
    /// recording.
    pub fn frame_timestamp(&self, frame_index: u64) -> f64 {
        if self.frames_per_second > 0.0 {
            frame_index as f64 / self.frames_per_second
        } else {
            0.0
        }
    }

    /// Frame dimensions after `rotation` is applied.
    pub fn display_dimensions(&self, rotation: Rotation) -> (u32, u32) {
        rotation.rotated_dimensions(self.width, self.height)
    }
}

fn tag_name(key: &str) -> &str {
    key.rsplit_once(':').map_or(key, |(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_with_tags(tags: &[(&str, &str)]) -> VideoDescriptor {
        VideoDescriptor {
            path: PathBuf::from("clip.mp4"),
            duration: Duration::from_secs(10),
            frames_per_second: 30.0,
            frame_count: 300,
            width: 1920,
            height: 1080,
            rotation: Rotation::None,
            codec: "h264".into(),
            format: "mp4".into(),
            tags: tags
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    #[test]
    fn rotation_from_degrees_normalises() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Clockwise270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Clockwise90));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn manual_rotation_always_wins() {
        let choice = RotationChoice::Fixed(Rotation::Clockwise90);
        assert_eq!(choice.resolve(Rotation::Clockwise180), Rotation::Clockwise90);
        assert_eq!(RotationChoice::Auto.resolve(Rotation::Clockwise180), Rotation::Clockwise180);
    }

    #[test]
    fn rotation_choice_parses_cli_values() {
        assert_eq!("auto".parse::<RotationChoice>().unwrap(), RotationChoice::Auto);
        assert_eq!(
            "270".parse::<RotationChoice>().unwrap(),
            RotationChoice::Fixed(Rotation::Clockwise270)
        );
        assert!("45".parse::<RotationChoice>().is_err());
        assert!("-90".parse::<RotationChoice>().is_err());
    }

    #[test]
    fn rotated_image_swaps_dimensions() {
        let image = DynamicImage::new_rgb8(8, 4);
        let rotated = Rotation::Clockwise90.apply(image);
        assert_eq!((rotated.width(), rotated.height()), (4, 8));
    }

    #[test]
    fn tag_lookup_ignores_group_and_case() {
        let descriptor = descriptor_with_tags(&[
            ("QuickTime:Make", "DJI"),
            ("creation_time", "2024-01-01T00:00:00Z"),
        ]);
        assert_eq!(descriptor.tag("make"), Some("DJI"));
        assert_eq!(descriptor.tag("Creation_Time"), Some("2024-01-01T00:00:00Z"));
        assert_eq!(descriptor.tag("Model"), None);
    }

    #[test]
    fn group_tag_requires_matching_group() {
        let descriptor = descriptor_with_tags(&[
            ("XMP-drone-dji:GimbalPitchDegree", "-30.5"),
            ("XMP-exif:GimbalPitchDegree", "1.0"),
        ]);
        assert_eq!(descriptor.group_tag("dji", "GimbalPitchDegree"), Some("-30.5"));
        assert!(descriptor.has_group("drone-dji"));
        assert!(!descriptor.has_group("parrot"));
    }

    #[test]
    fn blank_tags_are_treated_as_absent() {
        let descriptor = descriptor_with_tags(&[("Make", "  ")]);
        assert_eq!(descriptor.tag("Make"), None);
    }
}

//! ExifTool integration.
//!
//! ExifTool is used in both directions: [`ExifTool::read_tags`] pulls vendor
//! telemetry out of a video while probing, and [`ExifToolWriter`] writes each
//! [`FrameMetadataRecord`] into its extracted JPEG.
//!
//! Fields without a standard EXIF home go into two custom XMP namespaces,
//! `drone` (gimbal, flight, sensor size) and `video` (where in the source
//! video the frame came from). ExifTool learns about them from a config file
//! that [`ExifToolWriter::prepare`] generates in the workspace.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use serde_json::Value;

use crate::{
    error::{ProcessFailure, VidmeshError},
    process::run_with_timeout,
    synthesis::{AltitudeReference, FrameMetadataRecord},
};

/// File name of the generated ExifTool config.
pub const CONFIG_FILE_NAME: &str = "vidmesh_exiftool.config";

/// Default timeout for one ExifTool invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const XMP_CONFIG: &str = r#"# Generated by vidmesh. Defines the XMP-drone and XMP-video namespaces.
%Image::ExifTool::UserDefined = (
    'Image::ExifTool::XMP::Main' => {
        drone => { SubDirectory => { TagTable => 'Image::ExifTool::UserDefined::drone' } },
        video => { SubDirectory => { TagTable => 'Image::ExifTool::UserDefined::video' } },
    },
);

%Image::ExifTool::UserDefined::drone = (
    GROUPS    => { 0 => 'XMP', 1 => 'XMP-drone', 2 => 'Camera' },
    NAMESPACE => { 'drone' => 'https://vidmesh.dev/ns/drone/1.0/' },
    WRITABLE  => 'string',
    Vendor            => { },
    GimbalPitchDegree => { Writable => 'real' },
    GimbalRollDegree  => { Writable => 'real' },
    GimbalYawDegree   => { Writable => 'real' },
    FlightSpeed       => { Writable => 'real' },
    RelativeAltitude  => { Writable => 'real' },
    DistanceFromHome  => { Writable => 'real' },
    SensorWidth       => { Writable => 'real' },
    SensorHeight      => { Writable => 'real' },
);

%Image::ExifTool::UserDefined::video = (
    GROUPS    => { 0 => 'XMP', 1 => 'XMP-video', 2 => 'Video' },
    NAMESPACE => { 'video' => 'https://vidmesh.dev/ns/video/1.0/' },
    WRITABLE  => 'string',
    FrameIndex          => { Writable => 'integer' },
    OffsetSeconds       => { Writable => 'real' },
    WindowOffsetSeconds => { Writable => 'real' },
    Rotation            => { Writable => 'integer' },
);

1;
"#;

/// Handle to an ExifTool executable.
#[derive(Debug, Clone)]
pub struct ExifTool {
    binary: PathBuf,
    timeout: Duration,
}

impl ExifTool {
    /// Use `exiftool` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("exiftool")
    }

    /// Use a specific executable.
    pub fn with_binary<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The executable path.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    fn tool_name(&self) -> String {
        self.binary.display().to_string()
    }

    /// ExifTool's version string.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Process`] if ExifTool is missing or fails.
    pub fn version(&self) -> Result<String, VidmeshError> {
        let mut command = self.command();
        command.arg("-ver");
        let output = run_with_timeout(command, &self.tool_name(), self.timeout)?;
        Ok(output.stdout.trim().to_string())
    }

    /// Whether ExifTool can be run.
    pub fn is_available(&self) -> bool {
        match self.version() {
            Ok(version) => {
                log::debug!("Found ExifTool {version}");
                true
            }
            Err(error) => {
                log::debug!("ExifTool unavailable: {error}");
                false
            }
        }
    }

    /// Read every tag of `path`, including embedded telemetry samples.
    ///
    /// Keys are `Group:Tag` (ExifTool's family-1 groups); values are ExifTool's
    /// numeric (`-n`) output rendered as strings.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Process`] if ExifTool fails, or
    /// [`VidmeshError::Data`] if its output is not the expected JSON.
    pub fn read_tags(&self, path: &Path) -> Result<BTreeMap<String, String>, VidmeshError> {
        let mut command = self.command();
        command
            .args(["-j", "-n", "-G1", "-ee", "-api", "LargeFileSupport=1"])
            .arg(path);
        let output = run_with_timeout(command, &self.tool_name(), self.timeout)?;
        parse_json_tags(&output.stdout)
    }
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten ExifTool `-j -G1` output into a tag map.
///
/// Arrays are joined with `", "`; nested objects (binary placeholders) and
/// `SourceFile` are skipped.
pub fn parse_json_tags(json: &str) -> Result<BTreeMap<String, String>, VidmeshError> {
    let parsed: Value = serde_json::from_str(json)
        .map_err(|error| VidmeshError::Data(format!("unreadable ExifTool output: {error}")))?;
    let Some(Value::Object(object)) = parsed.as_array().and_then(|files| files.first()).cloned()
    else {
        return Err(VidmeshError::Data("ExifTool returned no tags".into()));
    };

    Ok(object
        .into_iter()
        .filter(|(key, _)| key != "SourceFile")
        .filter_map(|(key, value)| scalar_to_string(&value).map(|value| (key, value)))
        .collect())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Null | Value::Object(_) => None,
    }
}

/// Writes a metadata record into an image file.
pub trait MetadataWriter: Send + Sync {
    /// One-time setup before the first write, given the run's workspace.
    fn prepare(&mut self, _workspace: &Path) -> Result<(), VidmeshError> {
        Ok(())
    }

    /// Write `record` into `image`.
    fn write(&self, image: &Path, record: &FrameMetadataRecord) -> Result<(), VidmeshError>;
}

/// [`MetadataWriter`] backed by ExifTool.
#[derive(Debug, Clone)]
pub struct ExifToolWriter {
    exiftool: ExifTool,
    config: Option<PathBuf>,
}

impl ExifToolWriter {
    /// Write through `exiftool`.
    pub fn new(exiftool: ExifTool) -> Self {
        Self {
            exiftool,
            config: None,
        }
    }

    /// Path of the generated namespace config, once prepared.
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

impl MetadataWriter for ExifToolWriter {
    fn prepare(&mut self, workspace: &Path) -> Result<(), VidmeshError> {
        let path = workspace.join(CONFIG_FILE_NAME);
        fs::write(&path, XMP_CONFIG)?;
        log::debug!("Wrote ExifTool namespace config to {}", path.display());
        self.config = Some(path);
        Ok(())
    }

    fn write(&self, image: &Path, record: &FrameMetadataRecord) -> Result<(), VidmeshError> {
        let mut command = self.exiftool.command();
        // -config must come first.
        if let Some(config) = &self.config {
            command.arg("-config").arg(config);
        }
        command.args(["-overwrite_original", "-m"]);
        for (tag, value) in tag_assignments(record) {
            command.arg(format!("-{tag}={value}"));
        }
        command.arg(image);

        let output = run_with_timeout(command, &self.exiftool.tool_name(), self.exiftool.timeout)
            .map_err(|error| match error {
                VidmeshError::Process {
                    failure: failure @ ProcessFailure::ExitStatus(_),
                    detail,
                    ..
                } => VidmeshError::Write {
                    path: image.to_path_buf(),
                    reason: format!("exiftool {failure}: {detail}"),
                },
                other => other,
            })?;

        if !output.stdout.contains("1 image files updated") {
            return Err(VidmeshError::Write {
                path: image.to_path_buf(),
                reason: format!(
                    "exiftool did not update the file: {}",
                    output.stdout.trim()
                ),
            });
        }
        Ok(())
    }
}

/// ExifTool `TAG=VALUE` assignments for a record, in a stable order.
///
/// A `#` suffix on the tag name makes ExifTool take the value numerically.
pub fn tag_assignments(record: &FrameMetadataRecord) -> Vec<(String, String)> {
    let mut tags: Vec<(String, String)> = Vec::new();
    let mut push = |tag: &str, value: String| tags.push((tag.to_string(), value));

    if let Some(time) = &record.capture_time {
        for tag in ["EXIF:DateTimeOriginal", "EXIF:CreateDate"] {
            push(tag, time.exif_datetime());
        }
        for tag in ["EXIF:SubSecTimeOriginal", "EXIF:SubSecTimeDigitized"] {
            push(tag, time.exif_subseconds());
        }
        if let Some(offset) = time.exif_offset() {
            for tag in ["EXIF:OffsetTimeOriginal", "EXIF:OffsetTimeDigitized"] {
                push(tag, offset.clone());
            }
        }
    }

    if let Some(gps) = &record.gps {
        push("GPS:GPSLatitude", gps.latitude.to_exif_string());
        push("GPS:GPSLatitudeRef", gps.latitude_ref.letter().to_string());
        push("GPS:GPSLongitude", gps.longitude.to_exif_string());
        push("GPS:GPSLongitudeRef", gps.longitude_ref.letter().to_string());
        if let Some(altitude) = &gps.altitude {
            let reference = match altitude.reference {
                AltitudeReference::AboveSeaLevel => "0",
                AltitudeReference::BelowSeaLevel => "1",
            };
            push("GPS:GPSAltitude", format_real(altitude.meters));
            push("GPS:GPSAltitudeRef#", reference.into());
        }
    }

    let camera = &record.camera;
    if let Some(make) = &camera.make {
        push("EXIF:Make", make.clone());
    }
    if let Some(model) = &camera.model {
        push("EXIF:Model", model.clone());
    }
    if let Some(exposure) = camera.exposure_time {
        push("EXIF:ExposureTime#", format_real(exposure));
    }

    let sensor = &record.sensor;
    if let Some(focal) = sensor.focal_length_mm {
        push("EXIF:FocalLength#", format_real(focal));
    }
    if let Some(focal_35mm) = sensor.focal_length_35mm {
        push("EXIF:FocalLengthIn35mmFormat#", format!("{}", focal_35mm.round() as i64));
    }
    if let Some(f_number) = sensor.f_number {
        push("EXIF:FNumber#", format_real(f_number));
    }
    if let (Some(sensor_width), Some(sensor_height)) = (sensor.sensor_width_mm, sensor.sensor_height_mm)
        && sensor_width > 0.0
        && sensor_height > 0.0
    {
        push("EXIF:FocalPlaneXResolution#", format_real(f64::from(record.width) / sensor_width));
        push("EXIF:FocalPlaneYResolution#", format_real(f64::from(record.height) / sensor_height));
        // 4 = millimetres
        push("EXIF:FocalPlaneResolutionUnit#", "4".into());
        push("XMP-drone:SensorWidth", format_real(sensor_width));
        push("XMP-drone:SensorHeight", format_real(sensor_height));
    }

    push("EXIF:ExifImageWidth#", record.width.to_string());
    push("EXIF:ExifImageHeight#", record.height.to_string());
    // The pixels are already rotated.
    push("EXIF:Orientation#", "1".into());

    if let Some(vendor) = &record.vendor {
        push("XMP-drone:Vendor", vendor.clone());
    }
    if let Some(gimbal) = &record.gimbal {
        let angles = [
            ("XMP-drone:GimbalPitchDegree", gimbal.pitch),
            ("XMP-drone:GimbalRollDegree", gimbal.roll),
            ("XMP-drone:GimbalYawDegree", gimbal.yaw),
        ];
        for (tag, value) in angles {
            if let Some(value) = value {
                push(tag, format_real(value));
            }
        }
    }
    if let Some(flight) = &record.flight {
        let values = [
            ("XMP-drone:FlightSpeed", flight.speed),
            ("XMP-drone:RelativeAltitude", flight.relative_altitude),
            ("XMP-drone:DistanceFromHome", flight.distance_from_home),
        ];
        for (tag, value) in values {
            if let Some(value) = value {
                push(tag, format_real(value));
            }
        }
    }

    push("XMP-video:FrameIndex", record.frame_index.to_string());
    push("XMP-video:OffsetSeconds", format_real(record.offset_seconds));
    push("XMP-video:WindowOffsetSeconds", format_real(record.window_offset_seconds));
    push("XMP-video:Rotation", record.rotation.degrees().to_string());

    tags
}

/// Shortest decimal form with at most six fractional digits.
fn format_real(value: f64) -> String {
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" { "0".to_string() } else { trimmed.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::Rotation,
        synthesis::{
            CameraInfo, FlightTelemetry, GimbalOrientation, GpsAltitude, GpsPosition, SensorGeometry,
        },
    };

    fn record() -> FrameMetadataRecord {
        FrameMetadataRecord {
            frame_index: 45,
            offset_seconds: 1.5,
            window_offset_seconds: 0.5,
            capture_time: None,
            gps: GpsPosition::from_decimal(47.5, -122.25, Some(GpsAltitude::sea_level(-12.0))),
            gimbal: Some(GimbalOrientation {
                pitch: Some(-90.0),
                roll: None,
                yaw: Some(12.5),
            }),
            flight: Some(FlightTelemetry {
                relative_altitude: Some(30.0),
                ..Default::default()
            }),
            sensor: SensorGeometry::default(),
            camera: CameraInfo::default(),
            width: 1080,
            height: 1920,
            rotation: Rotation::Clockwise90,
            vendor: Some("dji".into()),
        }
    }

    fn lookup<'a>(tags: &'a [(String, String)], name: &str) -> Option<&'a str> {
        tags.iter()
            .find(|(tag, _)| tag == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn gps_is_written_as_dms_with_references() {
        let tags = tag_assignments(&record());
        assert_eq!(lookup(&tags, "GPS:GPSLatitude"), Some("47 30 0.0000"));
        assert_eq!(lookup(&tags, "GPS:GPSLongitudeRef"), Some("W"));
    }

    #[test]
    fn altitude_below_sea_level_and_relative_altitude_are_separate() {
        let tags = tag_assignments(&record());
        assert_eq!(lookup(&tags, "GPS:GPSAltitude"), Some("12"));
        assert_eq!(lookup(&tags, "GPS:GPSAltitudeRef#"), Some("1"));
        assert_eq!(lookup(&tags, "XMP-drone:RelativeAltitude"), Some("30"));
    }

    #[test]
    fn only_present_gimbal_angles_are_written() {
        let tags = tag_assignments(&record());
        assert_eq!(lookup(&tags, "XMP-drone:GimbalPitchDegree"), Some("-90"));
        assert_eq!(lookup(&tags, "XMP-drone:GimbalYawDegree"), Some("12.5"));
        assert_eq!(lookup(&tags, "XMP-drone:GimbalRollDegree"), None);
    }

    #[test]
    fn rotation_and_dimensions_reflect_applied_rotation() {
        let tags = tag_assignments(&record());
        assert_eq!(lookup(&tags, "XMP-video:Rotation"), Some("90"));
        assert_eq!(lookup(&tags, "EXIF:ExifImageWidth#"), Some("1080"));
        assert_eq!(lookup(&tags, "EXIF:Orientation#"), Some("1"));
    }

    #[test]
    fn no_capture_time_means_no_date_tags() {
        let tags = tag_assignments(&record());
        assert!(tags.iter().all(|(tag, _)| !tag.contains("DateTime")));
        assert_eq!(lookup(&tags, "XMP-video:OffsetSeconds"), Some("1.5"));
    }

    #[test]
    fn json_output_is_flattened() {
        let json = r#"[{
            "SourceFile": "clip.mp4",
            "QuickTime:Make": "DJI",
            "DJI:GPSLatitude": 47.5,
            "XMP-dc:Subject": ["a", "b"],
            "QuickTime:Thumbnail": {"_binary": true}
        }]"#;
        let tags = parse_json_tags(json).unwrap();
        assert_eq!(tags.get("QuickTime:Make").map(String::as_str), Some("DJI"));
        assert_eq!(tags.get("DJI:GPSLatitude").map(String::as_str), Some("47.5"));
        assert_eq!(tags.get("XMP-dc:Subject").map(String::as_str), Some("a, b"));
        assert!(!tags.contains_key("SourceFile"));
        assert!(!tags.contains_key("QuickTime:Thumbnail"));
    }

    #[test]
    fn empty_json_is_a_data_error() {
        assert!(matches!(parse_json_tags("[]"), Err(VidmeshError::Data(_))));
    }

    #[test]
    fn prepare_writes_namespace_config() {
        let workspace = tempfile::tempdir().unwrap();
        let mut writer = ExifToolWriter::new(ExifTool::new());
        writer.prepare(workspace.path()).unwrap();

        let config = fs::read_to_string(workspace.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(config.contains("'XMP-drone'"));
        assert!(config.contains("'XMP-video'"));
        assert_eq!(writer.config_path(), Some(workspace.path().join(CONFIG_FILE_NAME).as_path()));
    }
}

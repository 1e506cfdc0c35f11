//! Video inspection.
//!
//! [`inspect_descriptor`] looks at a probed [`VideoDescriptor`] together with
//! the sampling policy and returns an [`InspectionReport`]: things worth
//! knowing before extraction starts (no GPS, no start time, odd frame
//! rates) and an [`ExtractionPlan`] estimating the work.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use vidmesh::{FfmpegProber, SamplingPolicy, VideoProber, inspect_descriptor};
//!
//! let descriptor = FfmpegProber::new().describe(Path::new("input.mp4"))?;
//! let report = inspect_descriptor(&descriptor, &SamplingPolicy::every(15));
//! print!("{report}");
//! # Ok::<(), vidmesh::VidmeshError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

use serde::Serialize;

use crate::{
    descriptor::VideoDescriptor,
    selection::{BlurRejection, SamplingPolicy, SelectedFrame},
    synthesis::{GenericTelemetry, TelemetryExtractor, base_capture_time, default_extractors, exif_layer},
    timecode::format_timecode,
};

/// Frame rates above this are flagged as unusual.
const HIGH_FRAME_RATE: f64 = 240.0;

/// Estimated extraction work for a video and policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionPlan {
    /// Stored width and height.
    pub resolution: (u32, u32),
    pub frames_per_second: f64,
    pub duration: Duration,
    pub total_frames: u64,
    /// Window start.
    pub start: Duration,
    /// Window end, clamped to the video.
    pub end: Duration,
    pub interval: u64,
    /// Frames the grid yields inside the window.
    pub approximate_frames: u64,
    pub blur: Option<BlurRejection>,
}

impl ExtractionPlan {
    fn new(descriptor: &VideoDescriptor, policy: &SamplingPolicy) -> Self {
        let video_seconds = descriptor.duration.as_secs_f64();
        let start = policy.window.start.as_secs_f64().min(video_seconds);
        let end = policy
            .window
            .end_seconds()
            .map_or(video_seconds, |end| end.min(video_seconds));

        let window_frames = ((end - start).max(0.0) * descriptor.frames_per_second).round() as u64;
        let interval = policy.interval.max(1);

        Self {
            resolution: (descriptor.width, descriptor.height),
            frames_per_second: descriptor.frames_per_second,
            duration: descriptor.duration,
            total_frames: descriptor.frame_count,
            start: Duration::from_secs_f64(start),
            end: Duration::from_secs_f64(end),
            interval: policy.interval,
            approximate_frames: window_frames.div_ceil(interval),
            blur: policy.blur,
        }
    }
}

impl Display for ExtractionPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "Resolution:       {}x{}", self.resolution.0, self.resolution.1)?;
        writeln!(f, "Frame rate:       {:.3} fps", self.frames_per_second)?;
        writeln!(f, "Duration:         {}", format_timecode(self.duration))?;
        writeln!(f, "Total frames:     {}", self.total_frames)?;
        writeln!(
            f,
            "Window:           {} - {}",
            format_timecode(self.start),
            format_timecode(self.end)
        )?;
        writeln!(f, "Frame interval:   every {} frames", self.interval)?;
        writeln!(f, "Frames to extract: ~{}", self.approximate_frames)?;
        match &self.blur {
            Some(blur) => writeln!(
                f,
                "Blur rejection:   threshold {:.1}, look-ahead {}",
                blur.threshold,
                blur.max_look_ahead.unwrap_or(self.interval)
            ),
            None => writeln!(f, "Blur rejection:   off"),
        }
    }
}

/// Findings about one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionReport {
    /// Informational notices (not problems).
    pub info: Vec<String>,
    /// Issues that degrade the output without stopping the run.
    pub warnings: Vec<String>,
    /// Issues that will stop extraction.
    pub errors: Vec<String>,
    pub plan: ExtractionPlan,
}

impl InspectionReport {
    /// Returns `true` if no errors were found.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Display for InspectionReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for item in &self.info {
            writeln!(f, "[INFO] {item}")?;
        }
        for item in &self.warnings {
            writeln!(f, "[WARN] {item}")?;
        }
        for item in &self.errors {
            writeln!(f, "[ERROR] {item}")?;
        }
        write!(f, "{}", self.plan)
    }
}

/// Inspect `descriptor` for extraction under `policy`.
pub fn inspect_descriptor(descriptor: &VideoDescriptor, policy: &SamplingPolicy) -> InspectionReport {
    let mut info = Vec::new();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    // Stream
    info.push(format!(
        "Video: {} {}x{} @ {:.2} fps, ~{} frames, rotation {}",
        descriptor.codec,
        descriptor.width,
        descriptor.height,
        descriptor.frames_per_second,
        descriptor.frame_count,
        descriptor.rotation,
    ));

    if descriptor.width == 0 || descriptor.height == 0 {
        errors.push(format!(
            "Invalid video dimensions: {}x{}",
            descriptor.width, descriptor.height
        ));
    }

    if descriptor.frames_per_second <= 0.0 {
        warnings.push("Video frame rate is zero; frames cannot be timed".to_string());
    } else if descriptor.frames_per_second > HIGH_FRAME_RATE {
        warnings.push(format!(
            "Unusually high frame rate ({:.1} fps); consider a larger frame interval",
            descriptor.frames_per_second
        ));
    }

    if descriptor.duration.is_zero() {
        warnings.push("Video duration is zero".to_string());
    } else if policy.window.start >= descriptor.duration {
        errors.push(format!(
            "Start time {} is past the end of the video ({})",
            format_timecode(policy.window.start),
            format_timecode(descriptor.duration)
        ));
    }

    // Metadata
    let vendor = default_extractors()
        .into_iter()
        .find(|extractor| extractor.matches(descriptor));
    let first_frame = SelectedFrame {
        index: 0,
        timestamp: 0.0,
    };
    let telemetry = match &vendor {
        Some(extractor) => {
            info.push(format!("Telemetry schema: {}", extractor.vendor()));
            extractor
                .extract(descriptor, &first_frame)
                .or(GenericTelemetry.extract(descriptor, &first_frame))
        }
        None => GenericTelemetry.extract(descriptor, &first_frame),
    };

    if telemetry.coordinates.is_none() && exif_layer(descriptor).coordinates.is_none() {
        warnings.push("No GPS position found; frames will not be geotagged".to_string());
    }
    match base_capture_time(descriptor) {
        Some(base) => info.push(format!("Recording started {}", base.exif_datetime())),
        None => warnings.push(
            "No recording start time found; frames will carry offsets but no capture time"
                .to_string(),
        ),
    }

    InspectionReport {
        info,
        warnings,
        errors,
        plan: ExtractionPlan::new(descriptor, policy),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, path::PathBuf};

    use super::*;
    use crate::{descriptor::Rotation, selection::TimeWindow};

    fn descriptor(tags: &[(&str, &str)]) -> VideoDescriptor {
        VideoDescriptor {
            path: PathBuf::from("clip.mp4"),
            duration: Duration::from_secs(30),
            frames_per_second: 30.0,
            frame_count: 900,
            width: 1920,
            height: 1080,
            rotation: Rotation::None,
            codec: "h264".into(),
            format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
            tags: tags
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn plan_counts_window_frames() {
        let policy = SamplingPolicy::every(15)
            .with_window(TimeWindow::bounded(Duration::from_secs(10), Duration::from_secs(5)));
        let report = inspect_descriptor(&descriptor(&[]), &policy);

        assert_eq!(report.plan.approximate_frames, 10);
        assert_eq!(report.plan.end, Duration::from_secs(15));
        assert!(report.is_valid());
    }

    #[test]
    fn bare_video_warns_about_gps_and_time() {
        let report = inspect_descriptor(&descriptor(&[]), &SamplingPolicy::default());
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn dji_video_is_recognised() {
        let tags = [
            ("XMP-drone-dji:GPSLatitude", "47.5"),
            ("XMP-drone-dji:GPSLongitude", "8.25"),
            ("creation_time", "2024-05-01T10:00:00.000000Z"),
        ];
        let report = inspect_descriptor(&descriptor(&tags), &SamplingPolicy::default());

        assert!(report.info.iter().any(|line| line.contains("dji")));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn start_past_end_is_an_error() {
        let policy =
            SamplingPolicy::every(15).with_window(TimeWindow::from_start(Duration::from_secs(45)));
        let report = inspect_descriptor(&descriptor(&[]), &policy);
        assert!(!report.is_valid());
    }
}

//! Video probing.
//!
//! [`FfmpegProber`] opens a file with FFmpeg, reads the stream parameters of
//! its best video stream and collects every container and stream tag into a
//! [`VideoDescriptor`]. When an [`ExifTool`] handle is attached, vendor
//! telemetry that FFmpeg does not expose (DJI, Parrot, XMP blocks) is read as
//! well; a failed ExifTool read only loses that telemetry.

use std::{collections::BTreeMap, path::Path, time::Duration};

use ffmpeg_next::{
    codec::context::Context as CodecContext, format::stream::Stream, media::Type,
};
use ffmpeg_sys_next::AVPacketSideDataType;

use crate::{
    descriptor::{Rotation, VideoDescriptor},
    error::VidmeshError,
    exiftool::ExifTool,
    utilities::{av_duration, rational_to_f64},
};

/// Produces a [`VideoDescriptor`] for a file.
pub trait VideoProber {
    /// Describe the video at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Probe`] if the file cannot be opened or has no
    /// video stream.
    fn describe(&self, path: &Path) -> Result<VideoDescriptor, VidmeshError>;
}

/// [`VideoProber`] backed by `ffmpeg-next`, optionally enriched by ExifTool.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use vidmesh::{FfmpegProber, VideoProber};
///
/// let descriptor = FfmpegProber::new().describe(Path::new("input.mp4"))?;
/// println!(
///     "{}x{} @ {:.2} fps, {} frames",
///     descriptor.width, descriptor.height, descriptor.frames_per_second, descriptor.frame_count
/// );
/// # Ok::<(), vidmesh::VidmeshError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FfmpegProber {
    exiftool: Option<ExifTool>,
}

impl FfmpegProber {
    /// A prober that reads FFmpeg tags only.
    pub fn new() -> Self {
        Self { exiftool: None }
    }

    /// Also read tags through ExifTool.
    #[must_use]
    pub fn with_exiftool(mut self, exiftool: ExifTool) -> Self {
        self.exiftool = Some(exiftool);
        self
    }
}

impl VideoProber for FfmpegProber {
    fn describe(&self, path: &Path) -> Result<VideoDescriptor, VidmeshError> {
        log::debug!("Probing {}", path.display());

        let probe_error = |reason: String| VidmeshError::Probe {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| probe_error(format!("FFmpeg initialisation failed: {error}")))?;

        if !path.is_file() {
            return Err(probe_error("file does not exist".into()));
        }

        let input = ffmpeg_next::format::input(&path).map_err(|error| probe_error(error.to_string()))?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| probe_error("no video stream".into()))?;

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| probe_error(format!("unsupported video codec: {error}")))?;

        let mut frames_per_second = rational_to_f64(stream.avg_frame_rate());
        if frames_per_second <= 0.0 {
            frames_per_second = rational_to_f64(stream.rate());
        }

        let mut duration = av_duration(input.duration());
        if duration.is_zero() && stream.duration() > 0 {
            let seconds = stream.duration() as f64 * rational_to_f64(stream.time_base());
            duration = Duration::from_secs_f64(seconds.max(0.0));
        }

        let frame_count = match stream.frames() {
            count if count > 0 => count as u64,
            _ if frames_per_second > 0.0 => (duration.as_secs_f64() * frames_per_second) as u64,
            _ => 0,
        };

        let mut tags = BTreeMap::new();
        for (key, value) in input.metadata().iter() {
            tags.insert(key.to_string(), value.to_string());
        }
        for (key, value) in stream.metadata().iter() {
            tags.entry(key.to_string()).or_insert_with(|| value.to_string());
        }

        let rotation = display_matrix_rotation(&stream)
            .or_else(|| {
                tags.get("rotate")
                    .and_then(|value| value.trim().parse::<i64>().ok())
                    .and_then(Rotation::from_degrees)
            })
            .unwrap_or_default();

        if let Some(exiftool) = &self.exiftool {
            match exiftool.read_tags(path) {
                Ok(extra) => {
                    log::debug!("ExifTool reported {} tags", extra.len());
                    for (key, value) in extra {
                        tags.entry(key).or_insert(value);
                    }
                }
                Err(error) => log::warn!(
                    "Could not read embedded metadata from {}: {error}",
                    path.display()
                ),
            }
        }

        let descriptor = VideoDescriptor {
            path: path.to_path_buf(),
            duration,
            frames_per_second,
            frame_count,
            width: decoder.width(),
            height: decoder.height(),
            rotation,
            codec: decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            format: input.format().name().to_string(),
            tags,
        };

        log::debug!(
            "{}: {}x{} {} @ {:.3} fps, {:.3}s, {} frames, rotation {}",
            path.display(),
            descriptor.width,
            descriptor.height,
            descriptor.codec,
            descriptor.frames_per_second,
            descriptor.duration.as_secs_f64(),
            descriptor.frame_count,
            descriptor.rotation,
        );

        Ok(descriptor)
    }
}

/// Clockwise rotation from the stream's display matrix, if it has one.
fn display_matrix_rotation(stream: &Stream) -> Option<Rotation> {
    let parameters = stream.parameters();
    // SAFETY: the parameters pointer is valid while `stream` is borrowed;
    // side data is only read, and the matrix is checked to hold nine i32s.
    let counter_clockwise = unsafe {
        let parameters = parameters.as_ptr();
        let side_data = ffmpeg_sys_next::av_packet_side_data_get(
            (*parameters).coded_side_data,
            (*parameters).nb_coded_side_data,
            AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if side_data.is_null()
            || (*side_data).data.is_null()
            || (*side_data).size < 9 * size_of::<i32>()
        {
            return None;
        }
        ffmpeg_sys_next::av_display_rotation_get((*side_data).data as *const i32)
    };

    if !counter_clockwise.is_finite() {
        return None;
    }
    // av_display_rotation_get is counter-clockwise; round to a quarter turn.
    let clockwise = (-counter_clockwise / 90.0).round() as i64 * 90;
    Rotation::from_degrees(clockwise)
}

//! Internal utility functions.
//!
//! Helpers for pixel-data copying and timestamp conversion shared by the
//! prober and the decoder.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy the first plane of a packed video frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × bytes per
/// pixel). This strips the padding so the result can be passed directly to
/// [`image::ImageBuffer::from_raw`].
pub(crate) fn frame_to_packed_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = width as usize * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * height as usize].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Convert a time offset to FFmpeg's global `AV_TIME_BASE` (microseconds),
/// as expected by container-level seeking.
pub(crate) fn seconds_to_av_time_base(seconds: f64) -> i64 {
    (seconds.max(0.0) * ffmpeg_sys_next::AV_TIME_BASE as f64) as i64
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}

/// Frame index of a timestamp, rounded to the nearest frame.
pub(crate) fn seconds_to_frame_number(seconds: f64, frames_per_second: f64) -> u64 {
    (seconds * frames_per_second).round().max(0.0) as u64
}

/// Convert an FFmpeg `AV_TIME_BASE` duration to a [`Duration`].
pub(crate) fn av_duration(micros: i64) -> Duration {
    if micros > 0 {
        Duration::from_micros(micros as u64)
    } else {
        Duration::ZERO
    }
}

/// Convert an FFmpeg rational to `f64`, returning `0.0` for a zero
/// denominator.
pub(crate) fn rational_to_f64(rational: Rational) -> f64 {
    if rational.denominator() == 0 {
        0.0
    } else {
        f64::from(rational.numerator()) / f64::from(rational.denominator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_rescales_through_time_base() {
        assert_eq!(pts_to_seconds(90_000, Rational::new(1, 90_000)), 1.0);
        assert_eq!(seconds_to_frame_number(0.5005, 29.97), 15);
    }

    #[test]
    fn zero_denominator_is_zero() {
        assert_eq!(rational_to_f64(Rational::new(30, 0)), 0.0);
        assert_eq!(rational_to_f64(Rational::new(30000, 1001)), 30000.0 / 1001.0);
    }

    #[test]
    fn negative_durations_clamp_to_zero() {
        assert_eq!(av_duration(-1), Duration::ZERO);
        assert_eq!(seconds_to_av_time_base(1.5), 1_500_000);
    }
}

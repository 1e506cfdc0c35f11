//! Frame selection.
//!
//! [`select_frames`] turns a [`VideoDescriptor`] and a [`SamplingPolicy`] into
//! an ordered [`FrameSelection`]. Selection works on frame indices only; a
//! frame's timestamp is always `index / frames_per_second`.
//!
//! With blur rejection enabled each grid slot may be filled by a later, sharper
//! frame. Scoring goes through the [`SharpnessScorer`] seam so the selector
//! never touches the decoder directly.

use std::time::Duration;

use serde::Serialize;

use crate::{descriptor::VideoDescriptor, error::VidmeshError};

/// Slack used when converting a start time to a frame index.
const FRAME_TOLERANCE: f64 = 1e-9;

/// A `[start, start + duration)` time range within the video.
///
/// A `None` duration runs to the end of the video.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TimeWindow {
    /// Window start, measured from the start of the recording.
    pub start: Duration,
    /// Window length, or `None` to run to the end.
    pub duration: Option<Duration>,
}

impl TimeWindow {
    /// The whole video.
    pub fn full() -> Self {
        Self::default()
    }

    /// A window starting at `start` and running to the end of the video.
    pub fn from_start(start: Duration) -> Self {
        Self {
            start,
            duration: None,
        }
    }

    /// A window of fixed length.
    pub fn bounded(start: Duration, duration: Duration) -> Self {
        Self {
            start,
            duration: Some(duration),
        }
    }

    /// End of the window in seconds, if bounded.
    pub fn end_seconds(&self) -> Option<f64> {
        self.duration
            .map(|duration| self.start.as_secs_f64() + duration.as_secs_f64())
    }
}

/// Blur rejection settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlurRejection {
    /// Minimum acceptable sharpness score.
    pub threshold: f64,
    /// How many frames past a blurry candidate may be scanned. `None` means
    /// one interval length.
    pub max_look_ahead: Option<u64>,
}

impl BlurRejection {
    /// Blur rejection with the given threshold and the default look-ahead.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            max_look_ahead: None,
        }
    }

    /// Set an explicit look-ahead cap.
    #[must_use]
    pub fn with_max_look_ahead(mut self, frames: u64) -> Self {
        self.max_look_ahead = Some(frames);
        self
    }
}

/// Which frames to keep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingPolicy {
    /// Keep every `interval`-th frame.
    pub interval: u64,
    /// Time range to select from.
    pub window: TimeWindow,
    /// Optional blur rejection.
    pub blur: Option<BlurRejection>,
}

impl SamplingPolicy {
    /// Keep every `interval`-th frame of the whole video.
    pub fn every(interval: u64) -> Self {
        Self {
            interval,
            window: TimeWindow::full(),
            blur: None,
        }
    }

    /// Restrict selection to a time window.
    #[must_use]
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Enable blur rejection.
    #[must_use]
    pub fn with_blur_rejection(mut self, blur: BlurRejection) -> Self {
        self.blur = Some(blur);
        self
    }

    /// Check the policy on its own, without a video.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Config`] for a zero interval, a zero-length
    /// window, or a non-finite blur threshold.
    pub fn validate(&self) -> Result<(), VidmeshError> {
        if self.interval == 0 {
            return Err(VidmeshError::Config("frame interval must be at least 1".into()));
        }
        if self.window.duration.is_some_and(|duration| duration.is_zero()) {
            return Err(VidmeshError::Config("duration must be greater than zero".into()));
        }
        if let Some(blur) = &self.blur
            && (!blur.threshold.is_finite() || blur.threshold < 0.0)
        {
            return Err(VidmeshError::Config(format!(
                "blur threshold must be a non-negative number (got {})",
                blur.threshold
            )));
        }
        Ok(())
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::every(15)
    }
}

/// One frame chosen for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SelectedFrame {
    /// Zero-based frame index in decode order.
    pub index: u64,
    /// Seconds from the start of the recording.
    pub timestamp: f64,
}

/// The frames chosen from one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSelection {
    /// Selected frames in strictly increasing order.
    pub frames: Vec<SelectedFrame>,
    /// The window they were selected from.
    pub window: TimeWindow,
    /// Slots whose grid frame was replaced by a sharper one.
    pub blur_substitutions: u64,
}

impl FrameSelection {
    /// Number of selected frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Selected frame indices in order.
    pub fn indices(&self) -> Vec<u64> {
        self.frames.iter().map(|frame| frame.index).collect()
    }
}

/// Scores a frame by index for blur rejection.
pub trait SharpnessScorer {
    /// Sharpness of frame `frame_index`. Higher is sharper.
    fn score(&mut self, frame_index: u64) -> Result<f64, VidmeshError>;
}

impl<F> SharpnessScorer for F
where
    F: FnMut(u64) -> Result<f64, VidmeshError>,
{
    fn score(&mut self, frame_index: u64) -> Result<f64, VidmeshError> {
        self(frame_index)
    }
}

/// Select frames from a video according to `policy`.
///
/// A `scorer` is required when the policy enables blur rejection and ignored
/// otherwise.
///
/// # Errors
///
/// - [`VidmeshError::Config`] if the policy is invalid, or blur rejection is
///   enabled without a scorer.
/// - [`VidmeshError::Data`] if the video has no decodable frames, the window
///   starts at or after the end of the video, or the window holds no frame.
pub fn select_frames(
    descriptor: &VideoDescriptor,
    policy: &SamplingPolicy,
    mut scorer: Option<&mut dyn SharpnessScorer>,
) -> Result<FrameSelection, VidmeshError> {
    policy.validate()?;

    let fps = descriptor.frames_per_second;
    if descriptor.frame_count == 0 || !fps.is_finite() || fps <= 0.0 {
        return Err(VidmeshError::Data(format!(
            "{} has no decodable frames",
            descriptor.path.display()
        )));
    }

    let video_seconds = if descriptor.duration.is_zero() {
        descriptor.frame_count as f64 / fps
    } else {
        descriptor.duration.as_secs_f64()
    };
    let start_seconds = policy.window.start.as_secs_f64();
    if start_seconds >= video_seconds {
        return Err(VidmeshError::Data(format!(
            "start time {start_seconds:.3}s is at or beyond the video duration ({video_seconds:.3}s)"
        )));
    }

    let start_frame = first_frame_at_or_after(start_seconds, fps);
    let end_frame = policy
        .window
        .end_seconds()
        .map_or(descriptor.frame_count, |end| {
            first_frame_at_or_after(end, fps).min(descriptor.frame_count)
        });

    if start_frame >= end_frame {
        return Err(VidmeshError::Data(format!(
            "the window starting at {start_seconds:.3}s contains no frames"
        )));
    }

    if policy.blur.is_some() && scorer.is_none() {
        return Err(VidmeshError::Config(
            "blur rejection needs a sharpness scorer".into(),
        ));
    }

    let mut frames = Vec::new();
    let mut blur_substitutions = 0;
    let mut grid = start_frame;
    let mut candidate = start_frame;

    while candidate < end_frame {
        let chosen = match (&policy.blur, scorer.as_deref_mut()) {
            (Some(blur), Some(scorer)) => {
                let look_ahead = blur.max_look_ahead.unwrap_or(policy.interval);
                let last = candidate.saturating_add(look_ahead).min(end_frame - 1);
                sharpest_in_range(scorer, candidate, last, blur.threshold)
            }
            _ => candidate,
        };

        if chosen != candidate {
            blur_substitutions += 1;
            log::debug!("Frame {candidate} is blurry, using frame {chosen} instead");
        }

        frames.push(SelectedFrame {
            index: chosen,
            timestamp: chosen as f64 / fps,
        });

        grid = grid.saturating_add(policy.interval);
        candidate = grid.max(chosen + 1);
    }

    log::debug!(
        "Selected {} frames between frame {start_frame} and {end_frame} ({blur_substitutions} blur substitutions)",
        frames.len()
    );

    Ok(FrameSelection {
        frames,
        window: policy.window,
        blur_substitutions,
    })
}

/// Index of the first frame whose timestamp is `>= seconds`.
fn first_frame_at_or_after(seconds: f64, fps: f64) -> u64 {
    (seconds * fps - FRAME_TOLERANCE).ceil().max(0.0) as u64
}

/// Scan `first..=last`: the first frame reaching `threshold` wins, otherwise the
/// best-scoring frame. Ties keep the earliest frame.
fn sharpest_in_range(
    scorer: &mut dyn SharpnessScorer,
    first: u64,
    last: u64,
    threshold: f64,
) -> u64 {
    let mut best = (first, f64::NEG_INFINITY);
    for index in first..=last {
        let score = match scorer.score(index) {
            Ok(score) => score,
            Err(error) => {
                log::warn!("Could not score frame {index}: {error}");
                0.0
            }
        };
        if score >= threshold {
            return index;
        }
        if score > best.1 {
            best = (index, score);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, path::PathBuf};

    use super::*;
    use crate::descriptor::Rotation;

    fn descriptor(seconds: u64, fps: f64) -> VideoDescriptor {
        VideoDescriptor {
            path: PathBuf::from("clip.mp4"),
            duration: Duration::from_secs(seconds),
            frames_per_second: fps,
            frame_count: (seconds as f64 * fps) as u64,
            width: 640,
            height: 480,
            rotation: Rotation::None,
            codec: "h264".into(),
            format: "mp4".into(),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn interval_grid_without_window() {
        let selection = select_frames(&descriptor(2, 30.0), &SamplingPolicy::every(15), None).unwrap();
        assert_eq!(selection.indices(), vec![0, 15, 30, 45]);
        assert_eq!(selection.frames[1].timestamp, 0.5);
    }

    #[test]
    fn fractional_start_rounds_up_to_the_next_frame() {
        assert_eq!(first_frame_at_or_after(0.1, 30.0), 3);
        assert_eq!(first_frame_at_or_after(0.101, 30.0), 4);
        assert_eq!(first_frame_at_or_after(0.0, 30.0), 0);
    }

    #[test]
    fn zero_interval_is_a_config_error() {
        let error = select_frames(&descriptor(2, 30.0), &SamplingPolicy::every(0), None).unwrap_err();
        assert!(matches!(error, VidmeshError::Config(_)));
    }

    #[test]
    fn zero_duration_window_is_a_config_error() {
        let policy = SamplingPolicy::every(1).with_window(TimeWindow::bounded(Duration::ZERO, Duration::ZERO));
        let error = select_frames(&descriptor(2, 30.0), &policy, None).unwrap_err();
        assert!(matches!(error, VidmeshError::Config(_)));
    }

    #[test]
    fn empty_video_is_a_data_error() {
        let mut empty = descriptor(2, 30.0);
        empty.frame_count = 0;
        let error = select_frames(&empty, &SamplingPolicy::every(1), None).unwrap_err();
        assert!(matches!(error, VidmeshError::Data(_)));
    }

    #[test]
    fn start_past_end_is_a_data_error() {
        let policy = SamplingPolicy::every(1).with_window(TimeWindow::from_start(Duration::from_secs(2)));
        let error = select_frames(&descriptor(2, 30.0), &policy, None).unwrap_err();
        assert!(matches!(error, VidmeshError::Data(_)));
    }

    #[test]
    fn blur_without_scorer_is_rejected() {
        let policy = SamplingPolicy::every(5).with_blur_rejection(BlurRejection::new(10.0));
        let error = select_frames(&descriptor(2, 30.0), &policy, None).unwrap_err();
        assert!(matches!(error, VidmeshError::Config(_)));
    }

    #[test]
    fn scorer_failure_counts_as_zero() {
        let policy = SamplingPolicy::every(4).with_blur_rejection(BlurRejection::new(50.0));
        let mut scorer = |index: u64| {
            if index == 0 {
                Err(VidmeshError::VideoDecode("corrupt".into()))
            } else {
                Ok(60.0)
            }
        };
        let selection = select_frames(&descriptor(1, 8.0), &policy, Some(&mut scorer)).unwrap();
        assert_eq!(selection.indices(), vec![1, 4]);
        assert_eq!(selection.blur_substitutions, 1);
    }

    #[test]
    fn look_ahead_never_crosses_the_window_end() {
        let policy = SamplingPolicy::every(10)
            .with_window(TimeWindow::bounded(Duration::ZERO, Duration::from_millis(500)))
            .with_blur_rejection(BlurRejection::new(1000.0));
        let mut scored = Vec::new();
        let mut scorer = |index: u64| {
            scored.push(index);
            Ok(index as f64)
        };
        let selection = select_frames(&descriptor(2, 10.0), &policy, Some(&mut scorer)).unwrap();
        assert_eq!(selection.indices(), vec![4]);
        assert!(scored.iter().all(|&index| index < 5));
    }
}

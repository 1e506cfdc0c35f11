//! Pipeline configuration.
//!
//! [`PipelineConfig`] is a builder that carries every setting of a run
//! (sampling, rotation, metadata handling, tool locations and timeouts,
//! progress and cancellation) so that [`Pipeline`](crate::Pipeline) does not
//! need a long argument list.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use vidmesh::{
//!     BlurRejection, CancellationToken, PipelineConfig, Quality, SamplingPolicy, TimeWindow,
//! };
//!
//! let token = CancellationToken::new();
//! let config = PipelineConfig::new()
//!     .with_sampling(
//!         SamplingPolicy::every(10)
//!             .with_window(TimeWindow::bounded(Duration::from_secs(5), Duration::from_secs(60)))
//!             .with_blur_rejection(BlurRejection::new(120.0)),
//!     )
//!     .with_quality(Quality::Medium)
//!     .with_keep_metadata(true)
//!     .with_cancellation(token.clone());
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use crate::{
    descriptor::RotationChoice,
    error::VidmeshError,
    extract::DEFAULT_JPEG_QUALITY,
    exiftool,
    progress::{CancellationToken, NoOpProgress, ProgressCallback},
    reconstruct::{self, Quality},
    selection::SamplingPolicy,
    synthesis::TimestampPolicy,
};

/// Upper bounds on external tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTimeouts {
    /// Each ExifTool read or write.
    pub exiftool: Duration,
    /// The whole Meshroom reconstruction.
    pub meshroom: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            exiftool: exiftool::DEFAULT_TIMEOUT,
            meshroom: reconstruct::DEFAULT_TIMEOUT,
        }
    }
}

/// Settings for one [`Pipeline`](crate::Pipeline) run.
#[derive(Clone)]
pub struct PipelineConfig {
    pub(crate) sampling: SamplingPolicy,
    pub(crate) rotation: RotationChoice,
    pub(crate) quality: Quality,
    pub(crate) keep_metadata: bool,
    pub(crate) keep_intermediate: bool,
    pub(crate) temp_root: Option<PathBuf>,
    pub(crate) meshroom_binary: Option<PathBuf>,
    pub(crate) exiftool_binary: Option<PathBuf>,
    pub(crate) timeouts: ToolTimeouts,
    pub(crate) timestamp_policy: TimestampPolicy,
    pub(crate) jpeg_quality: u8,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for PipelineConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineConfig")
            .field("sampling", &self.sampling)
            .field("rotation", &self.rotation)
            .field("quality", &self.quality)
            .field("keep_metadata", &self.keep_metadata)
            .field("keep_intermediate", &self.keep_intermediate)
            .field("temp_root", &self.temp_root)
            .field("meshroom_binary", &self.meshroom_binary)
            .field("exiftool_binary", &self.exiftool_binary)
            .field("timeouts", &self.timeouts)
            .field("timestamp_policy", &self.timestamp_policy)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    /// Defaults: every 15th frame, automatic rotation, high quality, no
    /// metadata, workspace removed after the run.
    pub fn new() -> Self {
        Self {
            sampling: SamplingPolicy::default(),
            rotation: RotationChoice::Auto,
            quality: Quality::default(),
            keep_metadata: false,
            keep_intermediate: false,
            temp_root: None,
            meshroom_binary: None,
            exiftool_binary: None,
            timeouts: ToolTimeouts::default(),
            timestamp_policy: TimestampPolicy::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Which frames to extract.
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = sampling;
        self
    }

    /// How extracted frames are rotated.
    #[must_use]
    pub fn with_rotation(mut self, rotation: RotationChoice) -> Self {
        self.rotation = rotation;
        self
    }

    /// Reconstruction quality preset.
    #[must_use]
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Synthesise metadata and write it into every extracted image.
    #[must_use]
    pub fn with_keep_metadata(mut self, keep: bool) -> Self {
        self.keep_metadata = keep;
        self
    }

    /// Keep the workspace (extracted frames) after the run.
    #[must_use]
    pub fn with_keep_intermediate(mut self, keep: bool) -> Self {
        self.keep_intermediate = keep;
        self
    }

    /// Create the workspace under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_temp_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Use this Meshroom executable instead of searching for one.
    #[must_use]
    pub fn with_meshroom_binary<P: Into<PathBuf>>(mut self, binary: P) -> Self {
        self.meshroom_binary = Some(binary.into());
        self
    }

    /// Use this ExifTool executable instead of `exiftool` on `PATH`.
    #[must_use]
    pub fn with_exiftool_binary<P: Into<PathBuf>>(mut self, binary: P) -> Self {
        self.exiftool_binary = Some(binary.into());
        self
    }

    /// External tool timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// What to do when the video has no recorded start time.
    #[must_use]
    pub fn with_timestamp_policy(mut self, policy: TimestampPolicy) -> Self {
        self.timestamp_policy = policy;
        self
    }

    /// JPEG quality of extracted frames (1–100).
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// The run checks it between stages and between frames, and fails with
    /// [`VidmeshError::Cancelled`] once it is set.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The sampling policy.
    pub fn sampling(&self) -> &SamplingPolicy {
        &self.sampling
    }

    /// The rotation choice.
    pub fn rotation(&self) -> RotationChoice {
        self.rotation
    }

    /// The reconstruction quality.
    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Whether metadata is synthesised and written.
    pub fn keep_metadata(&self) -> bool {
        self.keep_metadata
    }

    /// Whether the workspace outlives the run.
    pub fn keep_intermediate(&self) -> bool {
        self.keep_intermediate
    }

    /// Check the settings for contradictions before anything runs.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), VidmeshError> {
        self.sampling.validate()?;

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(VidmeshError::Config(format!(
                "JPEG quality must be between 1 and 100 (got {})",
                self.jpeg_quality
            )));
        }
        if self.timestamp_policy == TimestampPolicy::Require && !self.keep_metadata {
            return Err(VidmeshError::Config(
                "requiring capture timestamps only makes sense with metadata enabled".into(),
            ));
        }
        if self.timeouts.exiftool.is_zero() || self.timeouts.meshroom.is_zero() {
            return Err(VidmeshError::Config("tool timeouts must be greater than zero".into()));
        }
        if let Some(root) = &self.temp_root
            && !root.is_dir()
        {
            return Err(VidmeshError::Config(format!(
                "temporary directory {} does not exist",
                root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampling().interval, 15);
        assert_eq!(config.quality(), Quality::High);
        assert_eq!(config.timeouts.meshroom, Duration::from_secs(12 * 60 * 60));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = PipelineConfig::new().with_sampling(SamplingPolicy::every(0));
        assert!(matches!(config.validate(), Err(VidmeshError::Config(_))));
    }

    #[test]
    fn required_timestamps_need_metadata() {
        let config = PipelineConfig::new().with_timestamp_policy(TimestampPolicy::Require);
        assert!(config.validate().is_err());
        assert!(config.with_keep_metadata(true).validate().is_ok());
    }

    #[test]
    fn jpeg_quality_is_bounded() {
        assert!(PipelineConfig::new().with_jpeg_quality(0).validate().is_err());
        assert!(PipelineConfig::new().with_jpeg_quality(100).validate().is_ok());
    }

    #[test]
    fn missing_temp_root_is_rejected() {
        let config = PipelineConfig::new().with_temp_root("/nonexistent/vidmesh-root");
        assert!(config.validate().is_err());
    }
}

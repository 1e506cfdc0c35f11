//! Error types for the `vidmesh` crate.
//!
//! This module defines [`VidmeshError`], the unified error type returned by
//! all fallible operations in the crate. Every variant names the offending
//! input (a path, a tag, a flag value) so the CLI can print a useful message
//! without extra context at the call site.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
    path::PathBuf,
    time::Duration,
};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// Why an external tool invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessFailure {
    /// The executable could not be found.
    NotFound,
    /// The executable exists but could not be started.
    Spawn,
    /// The tool ran and exited unsuccessfully. Holds the exit code when the
    /// platform reports one.
    ExitStatus(Option<i32>),
    /// The tool did not finish within the allotted time and was killed.
    Timeout(Duration),
}

impl Display for ProcessFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessFailure::NotFound => write!(f, "not found"),
            ProcessFailure::Spawn => write!(f, "could not be started"),
            ProcessFailure::ExitStatus(Some(code)) => write!(f, "exit code {code}"),
            ProcessFailure::ExitStatus(None) => write!(f, "terminated by signal"),
            ProcessFailure::Timeout(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// The unified error type for all `vidmesh` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VidmeshError {
    /// The video could not be opened or is corrupt.
    #[error("Failed to probe video at {path}: {reason}")]
    Probe {
        /// The video that was probed.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Frame selection or extraction cannot produce any output.
    #[error("{0}")]
    Data(String),

    /// No recorded start time was found, so absolute capture times cannot be
    /// anchored.
    #[error("No base capture time found in {path}")]
    MissingBaseTime {
        /// The video whose tags were searched.
        path: PathBuf,
    },

    /// Metadata could not be written into an extracted image.
    #[error("Failed to write metadata into {path}: {reason}")]
    Write {
        /// The image that was being tagged.
        path: PathBuf,
        /// Underlying reason (usually the tool's stderr).
        reason: String,
    },

    /// An external tool is missing, failed, or timed out.
    #[error("{tool} {failure}: {detail}")]
    Process {
        /// Tool name or path.
        tool: String,
        /// What went wrong.
        failure: ProcessFailure,
        /// Extra detail such as stderr output.
        detail: String,
    },

    /// Contradictory or invalid settings.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The run was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecode(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while encoding a frame.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl VidmeshError {
    /// Short name of the error kind, used in user-facing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            VidmeshError::Probe { .. } => "ProbeError",
            VidmeshError::Data(_) | VidmeshError::VideoDecode(_) => "DataError",
            VidmeshError::MissingBaseTime { .. } => "MissingBaseTimeError",
            VidmeshError::Write { .. } => "WriteError",
            VidmeshError::Process { .. } => "ProcessError",
            VidmeshError::Config(_) => "ConfigError",
            VidmeshError::Cancelled => "Cancelled",
            VidmeshError::Ffmpeg(_) => "FfmpegError",
            VidmeshError::Io(_) => "IoError",
            VidmeshError::Image(_) => "ImageError",
        }
    }

    /// Convenience constructor for [`VidmeshError::Process`].
    pub(crate) fn process(
        tool: impl Into<String>,
        failure: ProcessFailure,
        detail: impl Into<String>,
    ) -> Self {
        VidmeshError::Process {
            tool: tool.into(),
            failure,
            detail: detail.into(),
        }
    }
}

impl From<FfmpegError> for VidmeshError {
    fn from(error: FfmpegError) -> Self {
        VidmeshError::Ffmpeg(error.to_string())
    }
}

//! # vidmesh
//!
//! Turn a video into a photogrammetry model.
//!
//! `vidmesh` samples frames from a video (optionally swapping blurry frames
//! for sharper neighbours), writes them as JPEGs with synthesised EXIF/GPS
//! and XMP metadata, and hands them to Meshroom for reconstruction. Decoding
//! goes through FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate; metadata is
//! read and written with ExifTool.
//!
//! ## Quick Start
//!
//! ### Run the whole pipeline
//!
//! ```no_run
//! use vidmesh::{Pipeline, PipelineConfig, Quality, SamplingPolicy};
//!
//! let config = PipelineConfig::new()
//!     .with_sampling(SamplingPolicy::every(10))
//!     .with_quality(Quality::Medium)
//!     .with_keep_metadata(true);
//! let report = Pipeline::new(config)?.run("flight.mp4", "model/")?;
//! println!("{}", report.model_path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Select frames only
//!
//! ```no_run
//! use std::{path::Path, time::Duration};
//!
//! use vidmesh::{FfmpegProber, SamplingPolicy, TimeWindow, VideoProber, select_frames};
//!
//! let descriptor = FfmpegProber::new().describe(Path::new("flight.mp4"))?;
//! let policy = SamplingPolicy::every(15)
//!     .with_window(TimeWindow::bounded(Duration::from_secs(10), Duration::from_secs(5)));
//! let selection = select_frames(&descriptor, &policy, None)?;
//! for frame in &selection.frames {
//!     println!("frame {} at {:.3}s", frame.index, frame.timestamp);
//! }
//! # Ok::<(), vidmesh::VidmeshError>(())
//! ```
//!
//! ## Features
//!
//! - **Frame selection**: fixed interval inside an optional time window,
//!   with Laplacian-variance blur rejection
//! - **Rotation**: display-matrix detection or a manual override
//! - **Metadata synthesis**: capture time, GPS, gimbal, flight and sensor
//!   data layered from DJI/Parrot telemetry, generic tags and defaults
//! - **Metadata writing**: EXIF/GPS plus XMP `drone` and `video` namespaces
//! - **Reconstruction**: Meshroom with quality presets and progress
//!   following
//! - **Progress & cancellation**: callbacks and a `CancellationToken`
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Synthesise and write metadata for frames in parallel |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build. ExifTool is
//! needed at run time to keep metadata, and Meshroom to reconstruct.

pub mod configuration;
mod decoder;
pub mod descriptor;
pub mod error;
pub mod exiftool;
pub mod extract;
pub mod ffmpeg;
pub mod pipeline;
pub mod probe;
pub mod process;
pub mod progress;
pub mod reconstruct;
pub mod selection;
pub mod sharpness;
pub mod synthesis;
pub mod timecode;
mod utilities;
pub mod validation;

pub use configuration::{PipelineConfig, ToolTimeouts};
pub use descriptor::{Rotation, RotationChoice, VideoDescriptor};
pub use error::{ProcessFailure, VidmeshError};
pub use exiftool::{ExifTool, ExifToolWriter, MetadataWriter, tag_assignments};
pub use extract::{ExtractOutcome, ExtractedFrame, FfmpegExtractor, FrameExtractor};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use pipeline::{Pipeline, PipelineFailure, RunReport, Stage};
pub use probe::{FfmpegProber, VideoProber};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use reconstruct::{Meshroom, Quality, Reconstructor, find_model_output};
pub use selection::{
    BlurRejection, FrameSelection, SamplingPolicy, SelectedFrame, SharpnessScorer, TimeWindow,
    select_frames,
};
pub use sharpness::{laplacian_variance, sharpness_score};
pub use synthesis::{FrameMetadataRecord, Synthesizer, TelemetryExtractor, TimestampPolicy};
pub use timecode::{format_timecode, parse_timecode};
pub use validation::{ExtractionPlan, InspectionReport, inspect_descriptor};

//! The video-to-model pipeline.
//!
//! [`Pipeline`] drives one video through
//! `Probing → Selecting → Extracting → SynthesizingMetadata → Writing →
//! Reconstructing → CleaningUp → Done`. Each stage talks to a collaborator
//! trait ([`VideoProber`], [`FrameExtractor`], [`MetadataWriter`],
//! [`Reconstructor`]), so tests can swap any of them out.
//!
//! Extracted frames live in a temporary workspace that is removed when the
//! run ends, whether it succeeded or not, unless
//! [`PipelineConfig::with_keep_intermediate`] is set.
//!
//! # Example
//!
//! ```no_run
//! use vidmesh::{Pipeline, PipelineConfig};
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::new().with_keep_metadata(true))?;
//! match pipeline.run("flight.mp4", "model/") {
//!     Ok(report) => println!("Model written to {}", report.model_path.display()),
//!     Err(failure) => eprintln!("{} failed: {}", failure.stage, failure.error),
//! }
//! # Ok::<(), vidmesh::VidmeshError>(())
//! ```

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::Serialize;
use tempfile::TempDir;
use thiserror::Error;

use crate::{
    configuration::PipelineConfig,
    descriptor::VideoDescriptor,
    error::{ProcessFailure, VidmeshError},
    exiftool::{ExifTool, ExifToolWriter, MetadataWriter},
    extract::{ExtractedFrame, FfmpegExtractor, FrameExtractor},
    probe::{FfmpegProber, VideoProber},
    progress::{CancellationToken, ProgressCallback, ProgressTracker},
    reconstruct::{Meshroom, Reconstructor},
    selection::{FrameSelection, select_frames},
    synthesis::Synthesizer,
    validation::inspect_descriptor,
};

/// Prefix of workspace directory names.
pub const WORKSPACE_PREFIX: &str = "vidmesh_";

/// Name of the frame directory inside the workspace.
const FRAMES_DIR: &str = "frames";

/// A step of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Probing,
    Selecting,
    Extracting,
    SynthesizingMetadata,
    Writing,
    Reconstructing,
    CleaningUp,
    Done,
    Failed,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Stage::Probing => "probing",
            Stage::Selecting => "selecting frames",
            Stage::Extracting => "extracting frames",
            Stage::SynthesizingMetadata => "synthesizing metadata",
            Stage::Writing => "writing metadata",
            Stage::Reconstructing => "reconstructing",
            Stage::CleaningUp => "cleaning up",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A failed run: the stage that was executing and what went wrong.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct PipelineFailure {
    /// The stage that failed.
    pub stage: Stage,
    /// The underlying error.
    #[source]
    pub error: VidmeshError,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// The reconstructed model (or the best output Meshroom left behind).
    pub model_path: PathBuf,
    /// Frames chosen by the selector.
    pub frames_selected: usize,
    /// Frames written as images.
    pub frames_extracted: usize,
    /// Images that received metadata.
    pub frames_written: usize,
    /// Selected frames that could not be decoded.
    pub frames_skipped: Vec<u64>,
    /// Slots filled by a sharper frame.
    pub blur_substitutions: u64,
    /// The retained workspace, when intermediate files are kept.
    pub workspace: Option<PathBuf>,
}

/// Runs videos through selection, extraction, metadata and reconstruction.
pub struct Pipeline {
    config: PipelineConfig,
    prober: Box<dyn VideoProber>,
    extractor: Box<dyn FrameExtractor>,
    writer: Box<dyn MetadataWriter>,
    reconstructor: Box<dyn Reconstructor>,
}

impl Debug for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build a pipeline with the FFmpeg, ExifTool and Meshroom backends.
    ///
    /// Meshroom is located up front, and ExifTool is checked when metadata
    /// is enabled, so a missing tool fails before any work is done.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Config`] for invalid settings, or
    /// [`VidmeshError::Process`] with [`ProcessFailure::NotFound`] when a
    /// required tool is missing.
    pub fn new(config: PipelineConfig) -> Result<Self, VidmeshError> {
        config.validate()?;

        let exiftool = config
            .exiftool_binary
            .as_ref()
            .map_or_else(ExifTool::new, ExifTool::with_binary)
            .with_timeout(config.timeouts.exiftool);

        let mut prober = FfmpegProber::new();
        if config.keep_metadata {
            if !exiftool.is_available() {
                return Err(VidmeshError::process(
                    exiftool.binary().display().to_string(),
                    ProcessFailure::NotFound,
                    "ExifTool is required to keep metadata",
                ));
            }
            prober = prober.with_exiftool(exiftool.clone());
        }

        let mut extractor = FfmpegExtractor::new()
            .with_jpeg_quality(config.jpeg_quality)
            .with_progress(Arc::clone(&config.progress));
        if let Some(token) = &config.cancellation {
            extractor = extractor.with_cancellation(token.clone());
        }

        let meshroom = Meshroom::new(Meshroom::locate(config.meshroom_binary.as_deref())?)
            .with_timeout(config.timeouts.meshroom)
            .with_progress(Arc::clone(&config.progress));
        log::debug!("Using Meshroom at {}", meshroom.binary().display());

        Ok(Self {
            config,
            prober: Box::new(prober),
            extractor: Box::new(extractor),
            writer: Box::new(ExifToolWriter::new(exiftool)),
            reconstructor: Box::new(meshroom),
        })
    }

    /// Build a pipeline from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Config`] for invalid settings.
    pub fn with_collaborators(
        config: PipelineConfig,
        prober: Box<dyn VideoProber>,
        extractor: Box<dyn FrameExtractor>,
        writer: Box<dyn MetadataWriter>,
        reconstructor: Box<dyn Reconstructor>,
    ) -> Result<Self, VidmeshError> {
        config.validate()?;
        Ok(Self {
            config,
            prober,
            extractor,
            writer,
            reconstructor,
        })
    }

    /// The configuration this pipeline runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Probe `video` without running anything else.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Probe`] if the video cannot be read.
    pub fn describe(&self, video: &Path) -> Result<VideoDescriptor, VidmeshError> {
        self.prober.describe(video)
    }

    /// Turn `video` into a model under `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] naming the stage that failed. The
    /// workspace has been cleaned up by the time it is returned.
    pub fn run<P, Q>(&mut self, video: P, output_dir: Q) -> Result<RunReport, PipelineFailure>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        self.run_inner(video.as_ref(), None, output_dir.as_ref())
    }

    /// Like [`run`](Self::run), for a video already described with
    /// [`describe`](Self::describe). The video is not probed again.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] naming the stage that failed.
    pub fn run_described<Q>(
        &mut self,
        descriptor: VideoDescriptor,
        output_dir: Q,
    ) -> Result<RunReport, PipelineFailure>
    where
        Q: AsRef<Path>,
    {
        let video = descriptor.path.clone();
        self.run_inner(&video, Some(descriptor), output_dir.as_ref())
    }

    fn run_inner(
        &mut self,
        video: &Path,
        described: Option<VideoDescriptor>,
        output_dir: &Path,
    ) -> Result<RunReport, PipelineFailure> {
        let mut stage = Stage::Probing;
        let mut workspace = None;
        let outcome = self.execute(video, described, output_dir, &mut stage, &mut workspace);

        if outcome.is_ok() {
            stage = Stage::CleaningUp;
            self.announce(stage);
        }
        let retained = self.release(workspace);

        match (outcome, retained) {
            (Ok(mut report), Ok(kept)) => {
                report.workspace = kept;
                self.announce(Stage::Done);
                log::info!(
                    "Finished: {} frames, model at {}",
                    report.frames_extracted,
                    report.model_path.display()
                );
                Ok(report)
            }
            (Ok(_), Err(error)) | (Err(error), _) => {
                self.announce(Stage::Failed);
                log::error!("Pipeline failed while {stage}: {error}");
                Err(PipelineFailure { stage, error })
            }
        }
    }

    fn execute(
        &mut self,
        video: &Path,
        described: Option<VideoDescriptor>,
        output_dir: &Path,
        stage: &mut Stage,
        workspace: &mut Option<TempDir>,
    ) -> Result<RunReport, VidmeshError> {
        self.enter(stage, Stage::Probing)?;
        let descriptor = match described {
            Some(descriptor) => descriptor,
            None => self.prober.describe(video)?,
        };
        let policy = self.config.sampling;
        for warning in inspect_descriptor(&descriptor, &policy).warnings {
            log::warn!("{}: {warning}", video.display());
        }

        self.enter(stage, Stage::Selecting)?;
        let selection = self.select(&descriptor)?;
        log::info!(
            "Selected {} frames ({} replaced by sharper neighbours)",
            selection.len(),
            selection.blur_substitutions
        );

        let directory = self.create_workspace()?;
        let workspace_path = directory.path().to_path_buf();
        *workspace = Some(directory);
        let frames_dir = workspace_path.join(FRAMES_DIR);
        fs::create_dir(&frames_dir)?;

        self.enter(stage, Stage::Extracting)?;
        let rotation = self.config.rotation.resolve(descriptor.rotation);
        let mut outcome = self
            .extractor
            .extract(&descriptor, &selection, rotation, &frames_dir)?;

        let mut frames_written = 0;
        if self.config.keep_metadata {
            self.enter(stage, Stage::SynthesizingMetadata)?;
            let synthesizer = Synthesizer::new()
                .with_rotation_override(self.config.rotation.manual())
                .with_timestamp_policy(self.config.timestamp_policy)
                .with_window_start(policy.window.start);
            synthesize_records(&synthesizer, &descriptor, &mut outcome.frames)?;

            self.enter(stage, Stage::Writing)?;
            self.writer.prepare(&workspace_path)?;
            frames_written = write_records(
                self.writer.as_ref(),
                &outcome.frames,
                Arc::clone(&self.config.progress),
                self.config.cancellation.as_ref(),
            )?;
        } else {
            log::info!("Metadata disabled; skipping synthesis and writing");
        }

        self.enter(stage, Stage::Reconstructing)?;
        let model_path = self
            .reconstructor
            .run(&frames_dir, output_dir, self.config.quality)?;

        Ok(RunReport {
            model_path,
            frames_selected: selection.len(),
            frames_extracted: outcome.frames.len(),
            frames_written,
            frames_skipped: outcome.skipped,
            blur_substitutions: selection.blur_substitutions,
            workspace: None,
        })
    }

    fn select(&self, descriptor: &VideoDescriptor) -> Result<FrameSelection, VidmeshError> {
        let policy = &self.config.sampling;
        if policy.blur.is_none() {
            return select_frames(descriptor, policy, None);
        }
        let mut scorer = self.extractor.sharpness_scorer(descriptor)?;
        select_frames(descriptor, policy, Some(scorer.as_mut()))
    }

    fn create_workspace(&self) -> Result<TempDir, VidmeshError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let directory = match &self.config.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        log::debug!("Workspace: {}", directory.path().display());
        Ok(directory)
    }

    /// Remove the workspace, or keep it and return its path.
    fn release(&self, workspace: Option<TempDir>) -> Result<Option<PathBuf>, VidmeshError> {
        let Some(directory) = workspace else {
            return Ok(None);
        };
        if self.config.keep_intermediate {
            let path = directory.keep();
            log::info!("Keeping intermediate files in {}", path.display());
            return Ok(Some(path));
        }
        let path = directory.path().to_path_buf();
        directory.close()?;
        log::debug!("Removed workspace {}", path.display());
        Ok(None)
    }

    fn enter(&self, current: &mut Stage, next: Stage) -> Result<(), VidmeshError> {
        if self
            .config
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(VidmeshError::Cancelled);
        }
        *current = next;
        self.announce(next);
        Ok(())
    }

    fn announce(&self, stage: Stage) {
        log::info!("Stage: {stage}");
        ProgressTracker::new(Arc::clone(&self.config.progress), stage, None).start();
    }
}

#[cfg(feature = "rayon")]
fn synthesize_records(
    synthesizer: &Synthesizer,
    descriptor: &VideoDescriptor,
    frames: &mut [ExtractedFrame],
) -> Result<(), VidmeshError> {
    use ::rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};

    frames.par_iter_mut().try_for_each(|frame| {
        frame.record = Some(synthesizer.synthesize(descriptor, &frame.frame)?);
        Ok(())
    })
}

#[cfg(not(feature = "rayon"))]
fn synthesize_records(
    synthesizer: &Synthesizer,
    descriptor: &VideoDescriptor,
    frames: &mut [ExtractedFrame],
) -> Result<(), VidmeshError> {
    for frame in frames {
        frame.record = Some(synthesizer.synthesize(descriptor, &frame.frame)?);
    }
    Ok(())
}

/// Write every frame's record, returning how many were written.
fn write_records(
    writer: &dyn MetadataWriter,
    frames: &[ExtractedFrame],
    progress: Arc<dyn ProgressCallback>,
    cancellation: Option<&CancellationToken>,
) -> Result<usize, VidmeshError> {
    let tracker = Mutex::new(ProgressTracker::new(
        progress,
        Stage::Writing,
        Some(frames.len() as u64),
    ));

    let write_one = |frame: &ExtractedFrame| -> Result<usize, VidmeshError> {
        if cancellation.is_some_and(CancellationToken::is_cancelled) {
            return Err(VidmeshError::Cancelled);
        }
        let Some(record) = &frame.record else {
            return Ok(0);
        };
        writer.write(&frame.path, record)?;
        if let Ok(mut tracker) = tracker.lock() {
            tracker.advance(Some(frame.frame.index));
        }
        Ok(1)
    };

    #[cfg(feature = "rayon")]
    let written = {
        use ::rayon::iter::{IntoParallelRefIterator, ParallelIterator};
        frames.par_iter().map(write_one).try_reduce(|| 0, |a, b| Ok(a + b))?
    };
    #[cfg(not(feature = "rayon"))]
    let written = frames.iter().map(write_one).sum::<Result<usize, VidmeshError>>()?;

    log::info!("Wrote metadata into {written} images");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_display_in_words() {
        assert_eq!(Stage::SynthesizingMetadata.to_string(), "synthesizing metadata");
        assert_eq!(Stage::Done.to_string(), "done");
    }

    #[test]
    fn failure_names_the_stage() {
        let failure = PipelineFailure {
            stage: Stage::Reconstructing,
            error: VidmeshError::Cancelled,
        };
        assert_eq!(failure.to_string(), "reconstructing failed: Operation cancelled");
    }
}

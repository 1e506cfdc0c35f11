//! Frame extraction.
//!
//! A [`FrameExtractor`] turns a [`FrameSelection`] into JPEG files. The
//! default [`FfmpegExtractor`] decodes with [`FrameDecoder`], applies the
//! rotation correction, and encodes with `image`'s JPEG encoder.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{DynamicImage, codecs::jpeg::JpegEncoder};

use crate::{
    decoder::{FrameDecoder, PixelFormat},
    descriptor::{Rotation, VideoDescriptor},
    error::VidmeshError,
    pipeline::Stage,
    progress::{CancellationToken, NoOpProgress, ProgressCallback, ProgressTracker},
    selection::{FrameSelection, SelectedFrame, SharpnessScorer},
    sharpness::laplacian_variance,
    synthesis::FrameMetadataRecord,
};

/// Default JPEG quality (1–100).
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// One image written to the workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrame {
    /// The JPEG file.
    pub path: PathBuf,
    /// The video frame it came from.
    pub frame: SelectedFrame,
    /// Image width after rotation.
    pub width: u32,
    /// Image height after rotation.
    pub height: u32,
    /// Metadata, once synthesised.
    pub record: Option<FrameMetadataRecord>,
}

/// Result of an extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutcome {
    /// Frames written, in selection order.
    pub frames: Vec<ExtractedFrame>,
    /// Indices of selected frames that could not be decoded.
    pub skipped: Vec<u64>,
}

/// Writes selected frames as images.
pub trait FrameExtractor {
    /// Decode every frame of `selection`, rotate it, and write it to
    /// `output_dir`.
    ///
    /// A frame that cannot be decoded is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Data`] if no frame could be written, or an I/O
    /// or image error if writing fails.
    fn extract(
        &self,
        video: &VideoDescriptor,
        selection: &FrameSelection,
        rotation: Rotation,
        output_dir: &Path,
    ) -> Result<ExtractOutcome, VidmeshError>;

    /// A scorer that rates frames of `video` for blur rejection.
    fn sharpness_scorer(&self, video: &VideoDescriptor) -> Result<Box<dyn SharpnessScorer>, VidmeshError>;
}

/// File name used for an extracted frame.
pub fn frame_file_name(frame_index: u64) -> String {
    format!("frame_{frame_index:06}.jpg")
}

/// Write `image` as a JPEG at `quality`.
pub fn write_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<(), VidmeshError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
    // JPEG has no alpha channel.
    image.to_rgb8().write_with_encoder(encoder)?;
    Ok(())
}

/// [`FrameExtractor`] backed by FFmpeg decoding.
pub struct FfmpegExtractor {
    jpeg_quality: u8,
    progress: Arc<dyn ProgressCallback>,
    cancellation: Option<CancellationToken>,
}

impl FfmpegExtractor {
    /// An extractor writing JPEGs at [`DEFAULT_JPEG_QUALITY`].
    pub fn new() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Set the JPEG quality (1–100).
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Report each written frame to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Stop between frames when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExtractor for FfmpegExtractor {
    fn extract(
        &self,
        video: &VideoDescriptor,
        selection: &FrameSelection,
        rotation: Rotation,
        output_dir: &Path,
    ) -> Result<ExtractOutcome, VidmeshError> {
        let mut decoder = FrameDecoder::open(&video.path, video.frames_per_second)?;
        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.progress),
            Stage::Extracting,
            Some(selection.len() as u64),
        );
        tracker.start();

        let mut outcome = ExtractOutcome::default();
        for selected in &selection.frames {
            if self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(VidmeshError::Cancelled);
            }

            let image = match decoder.frame(selected.index, PixelFormat::Rgb8) {
                Ok(image) => rotation.apply(image),
                Err(error) => {
                    log::warn!("Skipping frame {}: {error}", selected.index);
                    outcome.skipped.push(selected.index);
                    tracker.advance(Some(selected.index));
                    continue;
                }
            };

            let path = output_dir.join(frame_file_name(selected.index));
            write_jpeg(&image, &path, self.jpeg_quality)?;
            log::debug!("Wrote {}", path.display());

            outcome.frames.push(ExtractedFrame {
                path,
                frame: *selected,
                width: image.width(),
                height: image.height(),
                record: None,
            });
            tracker.advance(Some(selected.index));
        }

        if outcome.frames.is_empty() {
            return Err(VidmeshError::Data(format!(
                "none of the {} selected frames of {} could be decoded",
                selection.len(),
                video.path.display()
            )));
        }

        log::info!(
            "Extracted {} frames ({} skipped)",
            outcome.frames.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    fn sharpness_scorer(&self, video: &VideoDescriptor) -> Result<Box<dyn SharpnessScorer>, VidmeshError> {
        let decoder = FrameDecoder::open(&video.path, video.frames_per_second)?;
        Ok(Box::new(DecodingScorer { decoder }))
    }
}

/// Scores frames by decoding them as grayscale.
struct DecodingScorer {
    decoder: FrameDecoder,
}

impl SharpnessScorer for DecodingScorer {
    fn score(&mut self, frame_index: u64) -> Result<f64, VidmeshError> {
        let image = self.decoder.frame(frame_index, PixelFormat::Gray8)?;
        let score = match &image {
            DynamicImage::ImageLuma8(gray) => laplacian_variance(gray),
            other => laplacian_variance(&other.to_luma8()),
        };
        log::trace!("Frame {frame_index} sharpness {score:.1}");
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_sort_by_frame_index() {
        assert_eq!(frame_file_name(42), "frame_000042.jpg");
        assert!(frame_file_name(999) < frame_file_name(1000));
    }

    #[test]
    fn jpeg_is_written_with_dimensions() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("frame.jpg");
        let image = DynamicImage::new_rgb8(32, 16);

        write_jpeg(&image, &path, 90).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }
}

//! Probing and extraction against a real video.
//!
//! These tests need `tests/fixtures/sample_video.mp4` and return early when it
//! is absent.

use std::path::Path;

use vidmesh::{
    BlurRejection, FfmpegExtractor, FfmpegProber, FrameExtractor, Rotation, SamplingPolicy,
    SharpnessScorer, VideoProber, inspect_descriptor, select_frames,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

#[test]
fn probe_sample_video() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let descriptor = FfmpegProber::new()
        .describe(Path::new(SAMPLE_VIDEO))
        .expect("Failed to probe test video");

    assert!(descriptor.width > 0 && descriptor.height > 0);
    assert!(descriptor.frames_per_second > 0.0);
    assert!(descriptor.frame_count > 0);
    assert!(!descriptor.duration.is_zero());
    assert!(inspect_descriptor(&descriptor, &SamplingPolicy::default()).is_valid());
}

#[test]
fn extract_every_nth_frame() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let descriptor = FfmpegProber::new()
        .describe(Path::new(SAMPLE_VIDEO))
        .expect("Failed to probe test video");
    let selection = select_frames(&descriptor, &SamplingPolicy::every(30), None).unwrap();
    let output = tempfile::tempdir().unwrap();

    let outcome = FfmpegExtractor::new()
        .extract(&descriptor, &selection, Rotation::None, output.path())
        .expect("Failed to extract frames");

    assert_eq!(outcome.frames.len() + outcome.skipped.len(), selection.len());
    for frame in &outcome.frames {
        let image = image::open(&frame.path).unwrap();
        assert_eq!((image.width(), image.height()), (descriptor.width, descriptor.height));
    }
}

#[test]
fn rotated_extraction_swaps_dimensions() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let descriptor = FfmpegProber::new()
        .describe(Path::new(SAMPLE_VIDEO))
        .expect("Failed to probe test video");
    let mut selection = select_frames(&descriptor, &SamplingPolicy::every(30), None).unwrap();
    selection.frames.truncate(1);
    let output = tempfile::tempdir().unwrap();

    let outcome = FfmpegExtractor::new()
        .extract(&descriptor, &selection, Rotation::Clockwise90, output.path())
        .unwrap();

    let frame = &outcome.frames[0];
    assert_eq!((frame.width, frame.height), (descriptor.height, descriptor.width));
}

#[test]
fn blur_rejection_scores_real_frames() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let descriptor = FfmpegProber::new()
        .describe(Path::new(SAMPLE_VIDEO))
        .expect("Failed to probe test video");
    let extractor = FfmpegExtractor::new();
    let mut scorer = extractor.sharpness_scorer(&descriptor).unwrap();

    assert!(scorer.score(0).unwrap() >= 0.0);

    let policy = SamplingPolicy::every(30).with_blur_rejection(BlurRejection::new(0.0));
    let selection = select_frames(&descriptor, &policy, Some(scorer.as_mut())).unwrap();
    assert_eq!(selection.blur_substitutions, 0);
}

//! Frame selection integration tests.
//!
//! These work on synthetic descriptors, so no video file is needed.

use std::{cell::RefCell, collections::BTreeMap, path::PathBuf, time::Duration};

use vidmesh::{
    BlurRejection, Rotation, SamplingPolicy, TimeWindow, VideoDescriptor, VidmeshError,
    select_frames,
};

fn descriptor(seconds: f64, fps: f64) -> VideoDescriptor {
    VideoDescriptor {
        path: PathBuf::from("synthetic.mp4"),
        duration: Duration::from_secs_f64(seconds),
        frames_per_second: fps,
        frame_count: (seconds * fps).round() as u64,
        width: 1920,
        height: 1080,
        rotation: Rotation::None,
        codec: "h264".into(),
        format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
        tags: BTreeMap::new(),
    }
}

#[test]
fn window_selection_matches_the_interval_grid() {
    let policy = SamplingPolicy::every(15)
        .with_window(TimeWindow::bounded(Duration::from_secs(10), Duration::from_secs(5)));
    let selection = select_frames(&descriptor(30.0, 30.0), &policy, None).unwrap();

    let timestamps: Vec<f64> = selection.frames.iter().map(|frame| frame.timestamp).collect();
    let expected: Vec<f64> = (0..10).map(|k| 10.0 + 0.5 * k as f64).collect();

    assert_eq!(selection.len(), 10);
    for (actual, expected) in timestamps.iter().zip(&expected) {
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }
    assert_eq!(selection.frames[0].index, 300);
    assert_eq!(selection.frames[9].index, 435);
}

#[test]
fn timestamps_follow_the_frame_grid() {
    for &(fps, interval) in &[(24.0, 7), (25.0, 15), (29.97, 10), (30.0, 1), (60.0, 45)] {
        let video = descriptor(12.0, fps);
        let selection = select_frames(&video, &SamplingPolicy::every(interval), None).unwrap();

        let mut previous = f64::NEG_INFINITY;
        for (k, frame) in selection.frames.iter().enumerate() {
            let expected = (k as u64 * interval) as f64 / fps;
            assert!((frame.timestamp - expected).abs() < 1e-9);
            assert!(frame.timestamp > previous);
            assert!(frame.timestamp < video.duration.as_secs_f64());
            previous = frame.timestamp;
        }

        let expected_count = video.frame_count.div_ceil(interval) as usize;
        assert_eq!(selection.len(), expected_count, "fps {fps}, interval {interval}");
    }
}

#[test]
fn no_window_frame_is_skipped_without_blur_rejection() {
    let policy = SamplingPolicy::every(4)
        .with_window(TimeWindow::bounded(Duration::from_secs(2), Duration::from_secs(3)));
    let selection = select_frames(&descriptor(10.0, 25.0), &policy, None).unwrap();

    for frame in &selection.frames {
        assert!(frame.timestamp >= 2.0 && frame.timestamp < 5.0);
    }
    let gaps: Vec<u64> = selection
        .indices()
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect();
    assert!(gaps.iter().all(|&gap| gap == 4));
    assert_eq!(selection.blur_substitutions, 0);
}

#[test]
fn blurry_slot_is_filled_by_the_next_sharp_frame() {
    let policy = SamplingPolicy::every(10)
        .with_window(TimeWindow::from_start(Duration::from_millis(100)))
        .with_blur_rejection(BlurRejection::new(150.0));
    let scored = RefCell::new(Vec::new());
    let mut scorer = |index: u64| -> Result<f64, VidmeshError> {
        scored.borrow_mut().push(index);
        Ok(if (3..=5).contains(&index) { 100.0 } else { 200.0 })
    };

    let selection = select_frames(&descriptor(1.0, 30.0), &policy, Some(&mut scorer)).unwrap();

    assert_eq!(selection.indices(), vec![6, 13, 23]);
    assert_eq!(selection.blur_substitutions, 1);
    assert!((selection.frames[0].timestamp - 0.2).abs() < 1e-9);
    assert_eq!(&scored.borrow()[..4], &[3, 4, 5, 6]);
}

#[test]
fn all_blurry_look_ahead_keeps_the_sharpest_frame() {
    let policy = SamplingPolicy::every(5)
        .with_blur_rejection(BlurRejection::new(1000.0).with_max_look_ahead(3));
    let mut scorer = |index: u64| -> Result<f64, VidmeshError> { Ok((index % 5) as f64) };

    let selection = select_frames(&descriptor(1.0, 10.0), &policy, Some(&mut scorer)).unwrap();

    // Slots start at 0 and 5; within each look-ahead the last frame scores best.
    assert_eq!(selection.indices(), vec![3, 8]);
}

#[test]
fn failing_scorer_counts_as_blurry() {
    let policy = SamplingPolicy::every(10).with_blur_rejection(BlurRejection::new(50.0));
    let mut scorer = |index: u64| -> Result<f64, VidmeshError> {
        if index == 0 {
            Err(VidmeshError::VideoDecode("corrupt packet".into()))
        } else {
            Ok(75.0)
        }
    };

    let selection = select_frames(&descriptor(1.0, 20.0), &policy, Some(&mut scorer)).unwrap();
    assert_eq!(selection.indices(), vec![1, 10]);
}

#[test]
fn start_beyond_the_video_is_a_data_error() {
    let policy = SamplingPolicy::every(15).with_window(TimeWindow::from_start(Duration::from_secs(30)));
    let error = select_frames(&descriptor(30.0, 30.0), &policy, None).unwrap_err();
    assert_eq!(error.kind(), "DataError");
}

#[test]
fn blur_rejection_without_scorer_is_a_config_error() {
    let policy = SamplingPolicy::every(15).with_blur_rejection(BlurRejection::new(100.0));
    let error = select_frames(&descriptor(5.0, 30.0), &policy, None).unwrap_err();
    assert!(matches!(error, VidmeshError::Config(_)));
}

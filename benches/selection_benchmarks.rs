//! Benchmarks for sharpness scoring, frame selection and extraction.
//!
//! Run with: cargo bench
//!
//! The extraction benchmark needs `tests/fixtures/sample_video.mp4`.

use std::{collections::BTreeMap, hint::black_box, path::Path, path::PathBuf, time::Duration};

use criterion::{BenchmarkId, Criterion};
use image::{GrayImage, Luma};
use vidmesh::{
    BlurRejection, FfmpegExtractor, FfmpegLogLevel, FfmpegProber, FrameExtractor, Rotation,
    SamplingPolicy, TimeWindow, VideoDescriptor, VideoProber, VidmeshError, laplacian_variance,
    select_frames,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn checkerboard(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([if (x / 8 + y / 8) % 2 == 0 { 32 } else { 224 }])
    })
}

fn synthetic_descriptor(seconds: u64, fps: f64) -> VideoDescriptor {
    VideoDescriptor {
        path: PathBuf::from("synthetic.mp4"),
        duration: Duration::from_secs(seconds),
        frames_per_second: fps,
        frame_count: (seconds as f64 * fps) as u64,
        width: 3840,
        height: 2160,
        rotation: Rotation::None,
        codec: "hevc".into(),
        format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
        tags: BTreeMap::new(),
    }
}

fn benchmark_sharpness(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("laplacian variance");
    for (width, height) in [(640, 360), (1920, 1080), (3840, 2160)] {
        let image = checkerboard(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &image,
            |bencher, image| bencher.iter(|| laplacian_variance(black_box(image))),
        );
    }
    group.finish();
}

fn benchmark_selection(criterion: &mut Criterion) {
    let descriptor = synthetic_descriptor(3600, 60.0);

    criterion.bench_function("select every 15th frame of one hour", |bencher| {
        let policy = SamplingPolicy::every(15);
        bencher.iter(|| select_frames(black_box(&descriptor), &policy, None).unwrap());
    });

    criterion.bench_function("select with blur rejection (synthetic scores)", |bencher| {
        let policy = SamplingPolicy::every(15)
            .with_window(TimeWindow::bounded(Duration::from_secs(60), Duration::from_secs(600)))
            .with_blur_rejection(BlurRejection::new(150.0));
        bencher.iter(|| {
            let mut scorer =
                |index: u64| -> Result<f64, VidmeshError> { Ok(((index * 37) % 300) as f64) };
            select_frames(&descriptor, &policy, Some(&mut scorer)).unwrap()
        });
    });
}

fn benchmark_extraction(criterion: &mut Criterion) {
    vidmesh::set_ffmpeg_log_level(FfmpegLogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    let descriptor = FfmpegProber::new().describe(Path::new(SAMPLE_VIDEO)).unwrap();
    let selection = select_frames(&descriptor, &SamplingPolicy::every(30), None).unwrap();

    let mut group = criterion.benchmark_group("extraction");
    group.sample_size(10);
    group.bench_function("extract every 30th frame as JPEG", |bencher| {
        bencher.iter(|| {
            let output = tempfile::tempdir().unwrap();
            FfmpegExtractor::new()
                .extract(&descriptor, &selection, Rotation::None, output.path())
                .unwrap()
        });
    });
    group.finish();
}

criterion::criterion_group!(benches, benchmark_sharpness, benchmark_selection, benchmark_extraction);
criterion::criterion_main!(benches);

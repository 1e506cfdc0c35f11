use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use vidmesh::{
    BlurRejection, FfmpegLogLevel, Pipeline, PipelineConfig, PipelineFailure, ProgressCallback,
    ProgressInfo, Quality, RotationChoice, SamplingPolicy, TimeWindow, TimestampPolicy,
    ToolTimeouts, VideoDescriptor, VidmeshError, format_timecode, inspect_descriptor,
    parse_timecode,
};

const CLI_AFTER_HELP: &str = "Examples:\n  vidmesh flight.mp4 model/\n  vidmesh flight.mp4 model/ -f 10 -k -q medium\n  vidmesh flight.mp4 model/ -s 00:01:00 -d 00:00:30 -b -t 150 --progress";

#[derive(Debug, Parser)]
#[command(
    name = "vidmesh",
    version,
    about = "Turn a video into a photogrammetry model with Meshroom",
    after_help = CLI_AFTER_HELP
)]
struct Args {
    /// Input video.
    video: PathBuf,

    /// Directory that receives the reconstructed model.
    output_dir: PathBuf,

    /// Keep every Nth frame.
    #[arg(short = 'f', long, default_value_t = 15)]
    frame_interval: u64,

    /// Rotation of extracted frames (0, 90, 180, 270, auto).
    #[arg(short = 'r', long, default_value = "auto")]
    rotate: String,

    /// Show debug logging and the video summary.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Write synthesised EXIF/GPS/XMP metadata into every frame.
    #[arg(short = 'k', long)]
    keep_metadata: bool,

    /// Reconstruction quality (low, medium, high).
    #[arg(short = 'q', long, default_value = "high")]
    quality: String,

    /// Start of the extraction window (HH:MM:SS, MM:SS or seconds).
    #[arg(short = 's', long)]
    start: Option<String>,

    /// Length of the extraction window (HH:MM:SS, MM:SS or seconds).
    #[arg(short = 'd', long)]
    duration: Option<String>,

    /// Replace blurry frames with sharper neighbours.
    #[arg(short = 'b', long)]
    detect_blur: bool,

    /// Minimum sharpness score when blur detection is on [default: 100].
    #[arg(short = 't', long)]
    blur_threshold: Option<f64>,

    /// How many frames past a blurry one may be searched [default: the interval].
    #[arg(long)]
    blur_look_ahead: Option<u64>,

    /// Path to the Meshroom executable.
    #[arg(short = 'm', long)]
    meshroom_bin: Option<PathBuf>,

    /// Path to the ExifTool executable.
    #[arg(long)]
    exiftool_bin: Option<PathBuf>,

    /// Keep the extracted frames after the run.
    #[arg(long)]
    keep_frames: bool,

    /// Directory for the temporary workspace.
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Fail when the video has no recording start time.
    #[arg(long)]
    require_timestamps: bool,

    /// JPEG quality of extracted frames (1-100).
    #[arg(long, default_value_t = 95)]
    jpeg_quality: u8,

    /// Meshroom timeout in seconds.
    #[arg(long)]
    meshroom_timeout: Option<u64>,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, default_value = "error")]
    ffmpeg_log_level: String,

    /// Show a progress bar.
    #[arg(long)]
    progress: bool,
}

const DEFAULT_BLUR_THRESHOLD: f64 = 100.0;

fn sampling_policy(args: &Args) -> Result<SamplingPolicy, VidmeshError> {
    if !args.detect_blur && (args.blur_threshold.is_some() || args.blur_look_ahead.is_some()) {
        return Err(VidmeshError::Config(
            "--blur-threshold and --blur-look-ahead need --detect-blur".into(),
        ));
    }

    let start = args
        .start
        .as_deref()
        .map(parse_timecode)
        .transpose()?
        .unwrap_or(Duration::ZERO);
    let window = match args.duration.as_deref().map(parse_timecode).transpose()? {
        Some(duration) => TimeWindow::bounded(start, duration),
        None => TimeWindow::from_start(start),
    };

    let mut policy = SamplingPolicy::every(args.frame_interval).with_window(window);
    if args.detect_blur {
        let mut blur = BlurRejection::new(args.blur_threshold.unwrap_or(DEFAULT_BLUR_THRESHOLD));
        if let Some(frames) = args.blur_look_ahead {
            blur = blur.with_max_look_ahead(frames);
        }
        policy = policy.with_blur_rejection(blur);
    }
    Ok(policy)
}

fn pipeline_config(args: &Args) -> Result<PipelineConfig, VidmeshError> {
    let rotation: RotationChoice = args.rotate.parse()?;
    let quality: Quality = args.quality.parse()?;

    let mut timeouts = ToolTimeouts::default();
    if let Some(seconds) = args.meshroom_timeout {
        timeouts.meshroom = Duration::from_secs(seconds);
    }

    let mut config = PipelineConfig::new()
        .with_sampling(sampling_policy(args)?)
        .with_rotation(rotation)
        .with_quality(quality)
        .with_keep_metadata(args.keep_metadata)
        .with_keep_intermediate(args.keep_frames)
        .with_jpeg_quality(args.jpeg_quality)
        .with_timeouts(timeouts);

    if args.require_timestamps {
        config = config.with_timestamp_policy(TimestampPolicy::Require);
    }
    if let Some(root) = &args.temp_dir {
        config = config.with_temp_root(root);
    }
    if let Some(binary) = &args.meshroom_bin {
        config = config.with_meshroom_binary(binary);
    }
    if let Some(binary) = &args.exiftool_bin {
        config = config.with_exiftool_binary(binary);
    }
    if args.progress {
        config = config.with_progress(Arc::new(TerminalProgress::new()?));
    }
    Ok(config)
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, VidmeshError> {
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )
        .map_err(|error| VidmeshError::Config(format!("progress template: {error}")))?;
        let bar = ProgressBar::new(0);
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match (info.total, info.percentage) {
            (Some(total), _) => {
                self.bar.set_length(total);
                self.bar.set_position(info.current);
            }
            (None, Some(percentage)) => {
                self.bar.set_length(100);
                self.bar.set_position(percentage.round() as u64);
            }
            (None, None) => {}
        }
        let message = match &info.message {
            Some(detail) => format!("{} ({detail})", info.stage),
            None => info.stage.to_string(),
        };
        self.bar.set_message(message);
    }
}

fn print_summary(descriptor: &VideoDescriptor, config: &PipelineConfig) {
    let summary = json!({
        "path": descriptor.path,
        "codec": descriptor.codec,
        "format": descriptor.format,
        "width": descriptor.width,
        "height": descriptor.height,
        "frames_per_second": descriptor.frames_per_second,
        "frame_count": descriptor.frame_count,
        "duration": format_timecode(descriptor.duration),
        "rotation": descriptor.rotation.degrees(),
        "tags": descriptor.tags.len(),
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{text}"),
        Err(error) => log::warn!("Could not format video summary: {error}"),
    }

    let report = inspect_descriptor(descriptor, config.sampling());
    println!("{}", "Extraction plan".bold());
    print!("{report}");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let level: FfmpegLogLevel = args.ffmpeg_log_level.parse()?;
    vidmesh::set_ffmpeg_log_level(level);

    let config = pipeline_config(args)?;
    let mut pipeline = Pipeline::new(config)?;

    let report = if args.verbose {
        let descriptor = pipeline.describe(&args.video)?;
        print_summary(&descriptor, pipeline.config());
        pipeline.run_described(descriptor, &args.output_dir)?
    } else {
        pipeline.run(&args.video, &args.output_dir)?
    };

    println!(
        "{} {} frames extracted, {} tagged, {} skipped",
        "done:".green().bold(),
        report.frames_extracted,
        report.frames_written,
        report.frames_skipped.len()
    );
    println!("{} {}", "model:".green().bold(), report.model_path.display());
    if let Some(workspace) = &report.workspace {
        println!("{} {}", "frames:".green().bold(), workspace.display());
    }
    Ok(())
}

fn describe_error(error: &(dyn std::error::Error + 'static), verbose: bool) -> String {
    if let Some(failure) = error.downcast_ref::<PipelineFailure>() {
        let message = format!("{}: {}", failure.error.kind(), failure.error);
        return if verbose {
            format!("{message} (stage: {})", failure.stage)
        } else {
            message
        };
    }
    if let Some(error) = error.downcast_ref::<VidmeshError>() {
        return format!("{}: {error}", error.kind());
    }
    error.to_string()
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    if let Err(error) = run(&args) {
        eprintln!(
            "{} {}",
            "error:".red().bold(),
            describe_error(error.as_ref(), args.verbose)
        );
        std::process::exit(1);
    }
}

//! Photogrammetry reconstruction through Meshroom.
//!
//! [`Meshroom`] runs `meshroom_batch` on the extracted frames with a quality
//! preset, under a timeout. Its console output is followed line by line:
//! node changes and percentages become progress reports, error and warning
//! lines are logged. When it finishes, [`find_model_output`] picks the model
//! file out of the output directory.

use std::{
    env,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
    sync::{Arc, LazyLock},
    time::{Duration, SystemTime},
};

use regex::Regex;

use crate::{
    error::{ProcessFailure, VidmeshError},
    pipeline::Stage,
    process::run_streaming,
    progress::{NoOpProgress, ProgressCallback, ProgressTracker},
};

/// Default reconstruction timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Executable names searched on `PATH`, in order.
#[cfg(windows)]
const BINARY_NAMES: [&str; 2] = ["meshroom_batch.exe", "meshroom.exe"];
#[cfg(not(windows))]
const BINARY_NAMES: [&str; 2] = ["meshroom_batch", "meshroom"];

/// Install locations checked when nothing is found on `PATH`.
const COMMON_LOCATIONS: [&str; 6] = [
    r"C:\Program Files\Meshroom\meshroom_batch.exe",
    r"C:\Program Files (x86)\Meshroom\meshroom_batch.exe",
    "/usr/local/bin/meshroom_batch",
    "/opt/Meshroom/meshroom_batch",
    "/opt/meshroom/meshroom_batch",
    "/Applications/Meshroom.app/Contents/MacOS/meshroom_batch",
];

/// Model file extensions, most preferred first.
const MODEL_EXTENSIONS: [&str; 3] = ["obj", "ply", "abc"];

/// Reconstruction quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// Fast, coarse mesh.
    Low,
    /// Balanced.
    Medium,
    /// Slowest, most detailed.
    #[default]
    High,
}

impl Quality {
    /// Meshroom `--preset` value.
    pub fn preset(self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.preset())
    }
}

impl FromStr for Quality {
    type Err = VidmeshError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(VidmeshError::Config(format!(
                "quality must be one of low, medium, high (got {other})"
            ))),
        }
    }
}

/// Runs a photogrammetry reconstruction.
pub trait Reconstructor {
    /// Reconstruct a model from the images in `image_dir` into `output_dir`
    /// and return the path of the produced model.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Process`] if the tool is missing, fails, or
    /// times out.
    fn run(&self, image_dir: &Path, output_dir: &Path, quality: Quality) -> Result<PathBuf, VidmeshError>;
}

/// [`Reconstructor`] backed by `meshroom_batch`.
pub struct Meshroom {
    binary: PathBuf,
    timeout: Duration,
    progress: Arc<dyn ProgressCallback>,
}

impl Meshroom {
    /// Use the Meshroom executable at `binary`.
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Find Meshroom: `explicit` if given, else `PATH`, else common install
    /// locations.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Process`] with [`ProcessFailure::NotFound`] if
    /// no executable is found.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, VidmeshError> {
        if let Some(path) = explicit {
            return if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(VidmeshError::process(
                    path.display().to_string(),
                    ProcessFailure::NotFound,
                    "the given Meshroom binary does not exist",
                ))
            };
        }

        let on_path = env::var_os("PATH").and_then(|paths| {
            env::split_paths(&paths).find_map(|directory| {
                BINARY_NAMES
                    .iter()
                    .map(|name| directory.join(name))
                    .find(|candidate| candidate.is_file())
            })
        });
        if let Some(found) = on_path {
            log::debug!("Found Meshroom on PATH: {}", found.display());
            return Ok(found);
        }

        COMMON_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                VidmeshError::process(
                    "meshroom",
                    ProcessFailure::NotFound,
                    "install Meshroom or pass its path with --meshroom-bin",
                )
            })
    }

    /// Set the reconstruction timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report node changes and percentages to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// The executable path.
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Reconstructor for Meshroom {
    fn run(&self, image_dir: &Path, output_dir: &Path, quality: Quality) -> Result<PathBuf, VidmeshError> {
        fs::create_dir_all(output_dir)?;

        let mut command = Command::new(&self.binary);
        command
            .arg("--input")
            .arg(image_dir)
            .arg("--output")
            .arg(output_dir)
            .arg("--preset")
            .arg(quality.preset());

        log::info!(
            "Running Meshroom ({} quality) on {}",
            quality,
            image_dir.display()
        );

        let tracker = ProgressTracker::new(Arc::clone(&self.progress), Stage::Reconstructing, None);
        tracker.start();
        let tool = self.binary.display().to_string();
        run_streaming(command, &tool, self.timeout, |line| {
            follow_line(&tracker, line)
        })?;

        let model = find_model_output(output_dir);
        log::info!("Reconstruction finished: {}", model.display());
        Ok(model)
    }
}

/// Something worth reporting in a Meshroom output line.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshroomEvent {
    /// `[i/n] Node` step header.
    Step {
        index: u32,
        total: u32,
        node: String,
    },
    /// A node started (`Processing node: X`).
    Node(String),
    /// A completion percentage, with the ETA text if printed.
    Percent {
        percent: f32,
        eta: Option<String>,
    },
    /// Feature extraction count (`Features: a/b`).
    Features { done: u64, total: u64 },
    /// An error line.
    Error(String),
    /// A warning line.
    Warning(String),
}

static STEP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[(\d+)/(\d+)\]\s+([A-Za-z][\w-]*)").expect("step pattern is valid")
});
static NODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)processing\s+node:?\s*([A-Za-z][\w-]*)").expect("node pattern is valid")
});
static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%(?:.*?\bETA[:\s]+(\S+))?").expect("percent pattern is valid")
});
static FEATURES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)features?:\s*(\d+)\s*/\s*(\d+)").expect("features pattern is valid")
});
static ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(error|fatal)\b").expect("error pattern is valid"));
static WARNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwarn(ing)?\b").expect("warning pattern is valid"));

/// Classify one line of Meshroom output.
pub fn parse_progress_line(line: &str) -> Option<MeshroomEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(captures) = STEP.captures(line) {
        return Some(MeshroomEvent::Step {
            index: captures[1].parse().ok()?,
            total: captures[2].parse().ok()?,
            node: captures[3].to_string(),
        });
    }
    if let Some(captures) = NODE.captures(line) {
        return Some(MeshroomEvent::Node(captures[1].to_string()));
    }
    if ERROR.is_match(line) {
        return Some(MeshroomEvent::Error(line.to_string()));
    }
    if WARNING.is_match(line) {
        return Some(MeshroomEvent::Warning(line.to_string()));
    }
    if let Some(captures) = FEATURES.captures(line) {
        return Some(MeshroomEvent::Features {
            done: captures[1].parse().ok()?,
            total: captures[2].parse().ok()?,
        });
    }
    if let Some(captures) = PERCENT.captures(line) {
        let percent: f32 = captures[1].parse().ok()?;
        if percent <= 100.0 {
            return Some(MeshroomEvent::Percent {
                percent,
                eta: captures.get(2).map(|eta| eta.as_str().to_string()),
            });
        }
    }
    None
}

fn follow_line(tracker: &ProgressTracker, line: &str) {
    log::trace!("meshroom: {line}");
    match parse_progress_line(line) {
        Some(MeshroomEvent::Step { index, total, node }) => {
            log::info!("Meshroom step {index}/{total}: {node}");
            let done = index.saturating_sub(1) as f32 / total.max(1) as f32 * 100.0;
            tracker.percentage(done, Some(node));
        }
        Some(MeshroomEvent::Node(node)) => {
            log::info!("Meshroom node: {node}");
            tracker.message(node);
        }
        Some(MeshroomEvent::Percent { percent, eta }) => {
            tracker.percentage(percent, eta.map(|eta| format!("ETA {eta}")));
        }
        Some(MeshroomEvent::Features { done, total }) => {
            log::debug!("Meshroom features: {done}/{total}");
        }
        Some(MeshroomEvent::Error(message)) => log::warn!("Meshroom: {message}"),
        Some(MeshroomEvent::Warning(message)) => log::warn!("Meshroom: {message}"),
        None => {}
    }
}

/// Locate the model Meshroom produced under `output_dir`.
///
/// Preference order: the newest `MeshroomCache/Texturing*` run holding an
/// `.obj` (else `.ply`, else `.abc`); a model file directly in `output_dir`;
/// `project.mg`; and finally `output_dir` itself.
pub fn find_model_output(output_dir: &Path) -> PathBuf {
    let mut runs = texturing_runs(&output_dir.join("MeshroomCache"));
    runs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    for (run, _) in &runs {
        if let Some(model) = model_in(run) {
            return model;
        }
    }
    if let Some(model) = model_in(output_dir) {
        return model;
    }

    let project = output_dir.join("project.mg");
    if project.is_file() {
        return project;
    }
    output_dir.to_path_buf()
}

/// Run directories under every `Texturing*` node, with their modification
/// times.
fn texturing_runs(cache: &Path) -> Vec<(PathBuf, SystemTime)> {
    let Ok(nodes) = fs::read_dir(cache) else {
        return Vec::new();
    };

    nodes
        .flatten()
        .filter(|node| node.file_name().to_string_lossy().starts_with("Texturing"))
        .filter_map(|node| fs::read_dir(node.path()).ok())
        .flat_map(|runs| runs.flatten())
        .filter(|run| run.path().is_dir())
        .map(|run| {
            let modified = run
                .metadata()
                .and_then(|metadata| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (run.path(), modified)
        })
        .collect()
}

/// The preferred model file directly inside `directory`.
fn model_in(directory: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(directory)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    MODEL_EXTENSIONS.iter().find_map(|extension| {
        files
            .iter()
            .find(|path| {
                path.extension()
                    .is_some_and(|found| found.eq_ignore_ascii_case(extension))
            })
            .cloned()
    })
}

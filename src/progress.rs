//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring a pipeline run,
//! [`CancellationToken`] for cooperative cancellation, and [`ProgressInfo`]
//! for progress snapshots. Every stage of the pipeline reports through the
//! same callback; per-item stages (extraction, metadata writing) report each
//! frame, the others report once when they start.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vidmesh::{Pipeline, PipelineConfig, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         match info.percentage {
//!             Some(pct) => println!("[{}] {pct:.1}%", info.stage),
//!             None => println!("[{}]", info.stage),
//!         }
//!     }
//! }
//!
//! let config = PipelineConfig::new().with_progress(Arc::new(PrintProgress));
//! let report = Pipeline::new(config)?.run("input.mp4", "model/")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use crate::pipeline::Stage;

/// A snapshot of pipeline progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// The stage being executed.
    pub stage: Stage,
    /// How many items (frames) have been processed so far in this stage.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the stage started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The frame currently being processed.
    pub current_frame: Option<u64>,
    /// Free-form detail, such as the reconstruction node being run.
    pub message: Option<String>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because callbacks may be
/// invoked from rayon worker threads.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// run. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called whenever progress is made.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to stop the run at
/// the next check (between stages and between frames).
///
/// # Example
///
/// ```
/// use vidmesh::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// // From another thread (or a signal handler, etc.):
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    stage: Stage,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, stage: Stage, total: Option<u64>) -> Self {
        Self {
            callback,
            stage,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Report the stage with no items processed yet.
    pub(crate) fn start(&self) {
        self.report(None, None);
    }

    /// Record one completed item.
    pub(crate) fn advance(&mut self, frame: Option<u64>) {
        self.current += 1;
        self.report(frame, None);
    }

    /// Report a free-form message without advancing.
    pub(crate) fn message(&self, message: impl Into<String>) {
        self.report(None, Some(message.into()));
    }

    /// Report an externally measured completion percentage.
    pub(crate) fn percentage(&self, percentage: f32, message: Option<String>) {
        let elapsed = self.start_time.elapsed();
        let estimated_remaining = (percentage > 0.0 && percentage < 100.0).then(|| {
            elapsed.mul_f32((100.0 - percentage) / percentage)
        });
        self.callback.on_progress(&ProgressInfo {
            stage: self.stage,
            current: self.current,
            total: self.total,
            percentage: Some(percentage.clamp(0.0, 100.0)),
            elapsed,
            estimated_remaining,
            current_frame: None,
            message,
        });
    }

    fn report(&self, frame: Option<u64>, message: Option<String>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        self.callback.on_progress(&ProgressInfo {
            stage: self.stage,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame: frame,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn advance_reports_percentage() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), Stage::Extracting, Some(4));
        tracker.start();
        tracker.advance(Some(10));

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].percentage, Some(0.0));
        assert_eq!(seen[1].percentage, Some(25.0));
        assert_eq!(seen[1].current_frame, Some(10));
        assert_eq!(seen[1].stage, Stage::Extracting);
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}

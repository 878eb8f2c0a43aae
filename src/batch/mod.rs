//! Batch thumbnail generation.
//!
//! Every input path becomes exactly one [`ThumbnailResult`] at the same
//! index. Items run on a dedicated rayon pool; an item that fails to load or
//! render is replaced by an all-black placeholder and the batch carries on.
//!
//! ```rust,ignore
//! use medimg_render::batch::ThumbnailGenerator;
//! use medimg_render::dicom::DicomLoader;
//! use medimg_render::progress::CallbackProgress;
//!
//! let progress = CallbackProgress::new(|event| println!("{}", event));
//! let batch = ThumbnailGenerator::new(DicomLoader::new(), progress)
//!     .max_parallel(4)
//!     .target_size(96)
//!     .generate(&paths)?;
//! println!("{} of {} rendered", batch.summary.succeeded, batch.summary.total);
//! ```

mod file_discovery;

pub use file_discovery::{discover_files, FileDiscovery};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::dicom::FrameSource;
use crate::error::{RenderError, Result};
use crate::progress::{CallbackProgress, NullProgress, ProgressEvent, ProgressHandler, ProgressPhase};
use crate::thumbnail::{downsample, ThumbnailResult, DEFAULT_THUMBNAIL_SIZE};
use crate::transform::IntensityTransform;

/// Outcome counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Number of input paths.
    pub total: usize,
    /// Thumbnails rendered from their source.
    pub succeeded: usize,
    /// Items replaced by a placeholder after an error.
    pub failed: usize,
    /// Items skipped because the batch was cancelled.
    pub cancelled: usize,
    /// Wall-clock time for the whole batch.
    pub elapsed: Duration,
}

/// Thumbnails and their summary.
#[derive(Debug, Clone)]
pub struct ThumbnailBatch {
    /// One result per input path, in input order.
    pub thumbnails: Vec<ThumbnailResult>,
    /// Outcome counts.
    pub summary: BatchSummary,
}

enum Outcome {
    Rendered(ThumbnailResult),
    Failed(ThumbnailResult),
    Cancelled(ThumbnailResult),
}

/// Renders thumbnails for many files in parallel.
pub struct ThumbnailGenerator<S: FrameSource, P: ProgressHandler> {
    source: S,
    progress: P,
    transform: IntensityTransform,
    max_parallel: usize,
    target_size: u32,
    cancelled: Arc<AtomicBool>,
}

impl<S: FrameSource, P: ProgressHandler> ThumbnailGenerator<S, P> {
    /// Create a generator with one worker per CPU and 64-pixel thumbnails.
    pub fn new(source: S, progress: P) -> Self {
        Self {
            source,
            progress,
            transform: IntensityTransform::default(),
            max_parallel: num_cpus::get(),
            target_size: DEFAULT_THUMBNAIL_SIZE,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a generator from pipeline configuration.
    pub fn with_config(source: S, progress: P, config: &PipelineConfig) -> Self {
        Self {
            transform: IntensityTransform::new(config),
            max_parallel: config.max_parallel.max(1),
            target_size: config.thumbnail_size,
            ..Self::new(source, progress)
        }
    }

    /// Set the number of worker threads.
    pub fn max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    /// Set the thumbnail edge length.
    pub fn target_size(mut self, size: u32) -> Self {
        self.target_size = size;
        self
    }

    /// Request cancellation. Items not yet started become placeholders.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Handle that cancels this generator from another thread.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.progress.is_cancelled()
    }

    /// Render one thumbnail per path.
    ///
    /// Only failing to start the worker pool is an error; per-item failures
    /// are reported through the progress handler and recorded as placeholders.
    pub fn generate(&self, paths: &[PathBuf]) -> Result<ThumbnailBatch> {
        let start = Instant::now();
        let total = paths.len();
        log::info!(
            "generating {} thumbnails ({}px, {} workers)",
            total,
            self.target_size,
            self.max_parallel
        );
        self.progress.on_progress(&ProgressEvent {
            total: Some(total),
            message: format!("Rendering {} files", total),
            ..ProgressEvent::new(ProgressPhase::Rendering)
        });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_parallel)
            .build()
            .map_err(|e| RenderError::Internal(e.to_string()))?;

        let completed = AtomicUsize::new(0);
        let outcomes: Vec<Outcome> = pool.install(|| {
            paths
                .par_iter()
                .enumerate()
                .map(|(index, path)| {
                    if self.is_cancelled() {
                        return Outcome::Cancelled(ThumbnailResult::empty(index, self.target_size));
                    }
                    match self.render_one(index, path) {
                        Ok(thumb) => {
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            self.progress
                                .on_progress(&ProgressEvent::rendered(path, done, total));
                            Outcome::Rendered(thumb)
                        }
                        Err(e) => {
                            log::warn!("thumbnail {} ({}) failed: {}", index, path.display(), e);
                            self.progress.on_error(&e, Some(path));
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            self.progress
                                .on_progress(&ProgressEvent::failed(path, done, total, &e));
                            Outcome::Failed(ThumbnailResult::empty(index, self.target_size))
                        }
                    }
                })
                .collect()
        });

        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        let thumbnails = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Outcome::Rendered(t) => {
                    summary.succeeded += 1;
                    t
                }
                Outcome::Failed(t) => {
                    summary.failed += 1;
                    t
                }
                Outcome::Cancelled(t) => {
                    summary.cancelled += 1;
                    t
                }
            })
            .collect();
        summary.elapsed = start.elapsed();

        log::info!(
            "thumbnails done: {} ok, {} failed, {} cancelled in {:.2?}",
            summary.succeeded,
            summary.failed,
            summary.cancelled,
            summary.elapsed
        );
        self.progress.on_progress(&ProgressEvent::complete(&summary));
        self.progress.on_complete(&summary);

        Ok(ThumbnailBatch {
            thumbnails,
            summary,
        })
    }

    fn render_one(&self, index: usize, path: &Path) -> Result<ThumbnailResult> {
        let (buffer, window) = self.source.load_with_window(path)?;
        let display = self.transform.transform(&buffer, window)?;
        let pixels = downsample(&display, buffer.width, buffer.height, self.target_size)?;

        Ok(ThumbnailResult {
            index,
            pixels,
            width: self.target_size,
            height: self.target_size,
            label: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        })
    }
}

impl<S: FrameSource> ThumbnailGenerator<S, NullProgress> {
    /// Create a generator without progress reporting.
    pub fn without_progress(source: S) -> Self {
        Self::new(source, NullProgress)
    }
}

/// Render thumbnails for `paths`, reporting each finished item's running count.
pub fn generate_thumbnails<S, F>(
    source: S,
    paths: &[PathBuf],
    target_size: u32,
    on_progress: F,
) -> Result<Vec<ThumbnailResult>>
where
    S: FrameSource,
    F: Fn(usize) + Send + Sync + 'static,
{
    ThumbnailGenerator::new(source, CallbackProgress::per_item(on_progress))
        .target_size(target_size)
        .generate(paths)
        .map(|batch| batch.thumbnails)
}

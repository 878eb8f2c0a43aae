//! Progress handler trait and related types.

use std::path::{Path, PathBuf};

use crate::batch::BatchSummary;
use crate::error::RenderError;

/// Stage of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Collecting input files.
    Discovery,
    /// Rendering thumbnails.
    Rendering,
    /// All items handled.
    Complete,
    /// An item failed and was replaced by a placeholder.
    Failed,
}

impl ProgressPhase {
    /// Human-readable description of the phase.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Discovery => "Discovering files",
            Self::Rendering => "Rendering",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.total {
            Some(total) => write!(
                f,
                "[{}/{}] {}: {}",
                self.completed, total, self.phase, self.message
            ),
            None => write!(f, "{}: {}", self.phase, self.message),
        }
    }
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Progress event emitted during batch operations.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Current phase.
    pub phase: ProgressPhase,

    /// File the event refers to, if any.
    pub current_file: Option<PathBuf>,

    /// Number of items in the batch, once known.
    pub total: Option<usize>,

    /// Items finished so far.
    ///
    /// Workers report concurrently, so a handler may observe counts out of
    /// order. The largest value seen is the true progress.
    pub completed: usize,

    /// Status message.
    pub message: String,
}

impl Default for ProgressEvent {
    fn default() -> Self {
        Self {
            phase: ProgressPhase::Discovery,
            current_file: None,
            total: None,
            completed: 0,
            message: String::new(),
        }
    }
}

impl ProgressEvent {
    /// Event for a specific phase with its default message.
    pub fn new(phase: ProgressPhase) -> Self {
        Self {
            phase,
            message: phase.description().into(),
            ..Default::default()
        }
    }

    /// Discovery phase event.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self {
            phase: ProgressPhase::Discovery,
            message: message.into(),
            ..Default::default()
        }
    }

    /// An item finished rendering.
    pub fn rendered(file: &Path, completed: usize, total: usize) -> Self {
        Self {
            phase: ProgressPhase::Rendering,
            current_file: Some(file.to_path_buf()),
            total: Some(total),
            completed,
            message: format!(
                "Rendered {}",
                file.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }

    /// An item failed and was replaced by a placeholder.
    pub fn failed(file: &Path, completed: usize, total: usize, error: &RenderError) -> Self {
        Self {
            phase: ProgressPhase::Failed,
            current_file: Some(file.to_path_buf()),
            total: Some(total),
            completed,
            message: format!(
                "Skipped {}: {}",
                file.file_name().unwrap_or_default().to_string_lossy(),
                error
            ),
        }
    }

    /// The batch finished; `summary` holds the final counts.
    pub fn complete(summary: &BatchSummary) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            current_file: None,
            total: Some(summary.total),
            completed: summary.succeeded + summary.failed,
            message: format!(
                "{} rendered, {} failed, {} cancelled",
                summary.succeeded, summary.failed, summary.cancelled
            ),
        }
    }

    /// Fraction of the batch finished, 0.0 when the total is unknown.
    pub fn fraction(&self) -> f64 {
        match self.total {
            Some(total) if total > 0 => self.completed as f64 / total as f64,
            _ => 0.0,
        }
    }
}

/// Receives progress updates from batch operations.
///
/// Handlers are shared across worker threads, so every method takes `&self`.
pub trait ProgressHandler: Send + Sync {
    /// Called when progress is updated.
    fn on_progress(&self, event: &ProgressEvent);

    /// Called when an item fails. The batch continues with a placeholder.
    fn on_error(&self, error: &RenderError, file: Option<&Path>) {
        let _ = (error, file);
    }

    /// Called once when the batch finishes.
    fn on_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }

    /// Return `true` to stop before the next item starts.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A handler that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressHandler for NullProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

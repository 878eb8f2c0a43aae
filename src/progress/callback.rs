//! Closure-driven progress reporting.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::batch::BatchSummary;
use crate::error::RenderError;

use super::handler::{ProgressEvent, ProgressHandler};

type EventFn = Box<dyn Fn(&ProgressEvent) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&RenderError, Option<&Path>) + Send + Sync>;
type SummaryFn = Box<dyn Fn(&BatchSummary) + Send + Sync>;

/// Progress handler backed by closures, with a cancellation flag.
///
/// ```rust,ignore
/// use medimg_render::progress::CallbackProgress;
///
/// let progress = CallbackProgress::new(|event| {
///     println!("{:.0}% {}", event.fraction() * 100.0, event.message);
/// })
/// .on_error(|err, file| eprintln!("{:?}: {}", file, err));
/// progress.cancel(); // stops before the next item starts
/// ```
pub struct CallbackProgress {
    event: EventFn,
    error: Option<ErrorFn>,
    summary: Option<SummaryFn>,
    cancelled: AtomicBool,
}

impl CallbackProgress {
    /// Call `callback` with every progress event.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        Self {
            event: Box::new(callback),
            error: None,
            summary: None,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Call `callback` with the running count each time an item finishes.
    ///
    /// Phase changes (discovery, completion) are not forwarded.
    pub fn per_item<F>(callback: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        Self::new(move |event: &ProgressEvent| {
            if event.current_file.is_some() {
                callback(event.completed);
            }
        })
    }

    /// Also call `callback` for every item that fails.
    pub fn on_error<E>(mut self, callback: E) -> Self
    where
        E: Fn(&RenderError, Option<&Path>) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(callback));
        self
    }

    /// Also call `callback` once with the batch summary.
    pub fn on_complete<C>(mut self, callback: C) -> Self
    where
        C: Fn(&BatchSummary) + Send + Sync + 'static,
    {
        self.summary = Some(Box::new(callback));
        self
    }

    /// Stop the batch before its next item. Items already started finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clear a previous [`cancel`](Self::cancel).
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl ProgressHandler for CallbackProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        (self.event)(event);
    }

    fn on_error(&self, error: &RenderError, file: Option<&Path>) {
        if let Some(ref f) = self.error {
            f(error, file);
        }
    }

    fn on_complete(&self, summary: &BatchSummary) {
        if let Some(ref f) = self.summary {
            f(summary);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressPhase;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_every_event_is_forwarded() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let progress = CallbackProgress::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        progress.on_progress(&ProgressEvent::new(ProgressPhase::Discovery));
        progress.on_progress(&ProgressEvent::rendered(Path::new("a.dcm"), 1, 2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_per_item_skips_phase_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let progress = CallbackProgress::per_item(move |n| seen_clone.lock().unwrap().push(n));
        progress.on_progress(&ProgressEvent::new(ProgressPhase::Rendering));
        progress.on_progress(&ProgressEvent::rendered(Path::new("a.dcm"), 1, 3));
        progress.on_progress(&ProgressEvent::rendered(Path::new("b.dcm"), 2, 3));
        progress.on_progress(&ProgressEvent::new(ProgressPhase::Complete));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_error_callback() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let failures_clone = failures.clone();

        let progress = CallbackProgress::new(|_| {}).on_error(move |_, file| {
            failures_clone
                .lock()
                .unwrap()
                .push(file.map(Path::to_path_buf));
        });

        let error = RenderError::DecodeFailure("truncated".into());
        ProgressHandler::on_error(&progress, &error, Some(Path::new("bad.dcm")));
        ProgressHandler::on_error(&progress, &error, None);
        assert_eq!(
            *failures.lock().unwrap(),
            vec![Some(PathBuf::from("bad.dcm")), None]
        );
    }

    #[test]
    fn test_completion_callback() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let progress = CallbackProgress::new(|_| {}).on_complete(move |summary| {
            seen_clone.store(summary.total, Ordering::SeqCst);
        });

        let summary = BatchSummary {
            total: 7,
            ..Default::default()
        };
        ProgressHandler::on_complete(&progress, &summary);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_cancel_and_reset() {
        let progress = CallbackProgress::new(|_| {});
        assert!(!progress.is_cancelled());
        progress.cancel();
        assert!(progress.is_cancelled());
        progress.reset();
        assert!(!progress.is_cancelled());
    }
}

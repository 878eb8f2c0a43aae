//! Progress reporting for batch operations.
//!
//! Batch workers report through a shared [`ProgressHandler`]. Handlers can
//! also request cancellation, which is honoured between items.

mod callback;
mod handler;

pub use callback::CallbackProgress;
pub use handler::{NullProgress, ProgressEvent, ProgressHandler, ProgressPhase};

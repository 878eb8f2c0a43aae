//! DICOM Rendering Library
//!
//! Turns decoded DICOM frames into display-ready 8-bit grayscale: rescale and
//! window/level mapping, intensity histograms, nearest-neighbour thumbnails
//! and a small PNG writer.
//!
//! # Features
//!
//! - **Window/level**: exact rescale plus windowing with closed edges, run
//!   in parallel chunks for large frames
//! - **Histograms**: 256-bin summaries of display or native 16-bit samples
//! - **Thumbnails**: batch generation where one bad file never aborts the rest
//! - **PNG**: dependency-light grayscale encoder with its own CRC-32 and Adler-32
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use medimg_render::{Preset, RenderPipeline};
//!
//! let pipeline = RenderPipeline::default();
//! let frame = pipeline.render_file("slice.dcm", Some(Preset::CtLung.window_level()))?;
//! std::fs::write("slice.png", pipeline.encode(&frame)?)?;
//! println!("peak bin {}", frame.histogram.peak_index);
//! ```
//!
//! Frames that are already in memory skip the loader:
//!
//! ```rust,ignore
//! use medimg_render::{apply_window_level, SampleBuffer, WindowLevel};
//!
//! let buffer = SampleBuffer::from_i16(2, 1, &[0, 1024]).with_rescale(1.0, -1024.0);
//! let display = apply_window_level(&buffer, WindowLevel::DEFAULT)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod dicom;
pub mod error;
pub mod histogram;
pub mod pipeline;
pub mod progress;
pub mod raster;
pub mod sample;
pub mod thumbnail;
pub mod transform;
pub mod window;

// Re-export commonly used types
pub use batch::{generate_thumbnails, BatchSummary, FileDiscovery, ThumbnailGenerator};
pub use config::{CompressionLevel, PipelineConfig};
pub use dicom::{DicomLoader, FrameSource};
pub use error::{RenderError, Result};
pub use histogram::{histogram, sample_histogram, Histogram, HistogramEngine};
pub use pipeline::{RenderPipeline, RenderedFrame};
pub use raster::{encode_grayscale, PngEncoder};
pub use sample::{DisplayBuffer, SampleBuffer};
pub use thumbnail::{downsample, ThumbnailResult};
pub use transform::{apply_window_level, IntensityTransform};
pub use window::{Preset, WindowLevel};

/// Library version information.
pub mod version {
    /// Library version string.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Library name.
    pub const NAME: &str = env!("CARGO_PKG_NAME");

    /// Get full version string.
    pub fn full_version() -> String {
        format!("{} {}", NAME, VERSION)
    }
}

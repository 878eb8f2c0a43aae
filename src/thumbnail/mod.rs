//! Nearest-neighbour thumbnails.

use serde::Serialize;

use crate::error::{RenderError, Result};

pub use crate::config::DEFAULT_THUMBNAIL_SIZE;

/// One thumbnail in a batch, aligned with its input by `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThumbnailResult {
    /// Position of the source in the batch input.
    pub index: usize,
    /// `width * height` display bytes.
    pub pixels: Vec<u8>,
    /// Thumbnail width (equals the target size).
    pub width: u32,
    /// Thumbnail height (equals the target size).
    pub height: u32,
    /// Source file name; `None` for placeholders.
    pub label: Option<String>,
}

impl ThumbnailResult {
    /// All-black placeholder for a source that could not be rendered.
    pub fn empty(index: usize, size: u32) -> Self {
        let edge = size as usize;
        Self {
            index,
            pixels: vec![0; edge * edge],
            width: size,
            height: size,
            label: None,
        }
    }

    /// One-based position for display.
    pub fn display_number(&self) -> usize {
        self.index + 1
    }

    /// Whether this is a placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.label.is_none()
    }
}

/// Resample a display buffer to `target_size x target_size`.
///
/// Each output pixel copies the source pixel at
/// `(floor(x * src_width / target), floor(y * src_height / target))`,
/// clamped to the source bounds. Sources smaller than the target are
/// upsampled the same way.
pub fn downsample(
    source: &[u8],
    src_width: u32,
    src_height: u32,
    target_size: u32,
) -> Result<Vec<u8>> {
    if src_width == 0 || src_height == 0 {
        return Err(RenderError::InvalidBuffer(format!(
            "Cannot downsample a {}x{} image",
            src_width, src_height
        )));
    }
    let (sw, sh) = (src_width as usize, src_height as usize);
    if source.len() != sw * sh {
        return Err(RenderError::InvalidBuffer(format!(
            "Thumbnail source size mismatch for {}x{}: expected {} bytes, got {}",
            src_width,
            src_height,
            sw * sh,
            source.len()
        )));
    }

    let target = target_size as usize;
    let scale_x = src_width as f64 / target_size as f64;
    let scale_y = src_height as f64 / target_size as f64;

    let mut out = vec![0u8; target * target];
    for (y, row) in out.chunks_exact_mut(target.max(1)).enumerate() {
        let sy = ((y as f64 * scale_y) as usize).min(sh - 1);
        let src_row = &source[sy * sw..(sy + 1) * sw];
        for (x, dst) in row.iter_mut().enumerate() {
            let sx = ((x as f64 * scale_x) as usize).min(sw - 1);
            *dst = src_row[sx];
        }
    }
    Ok(out)
}

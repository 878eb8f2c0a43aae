//! Intensity transform: rescale plus window/level to 8-bit grayscale.
//!
//! Every sample is read at its native width, rescaled to a physical value
//! `v = raw * slope + intercept` and mapped through the window with
//! [`WindowMapper::map`]. Frames below the parallel threshold run on the
//! calling thread; larger frames are split into one contiguous chunk per
//! worker and filled concurrently. Chunks write disjoint output ranges, so
//! no synchronization is needed until the join.

mod pool;

pub use pool::{BufferPool, PoolStats, PooledBuffer};

use byteorder::{ByteOrder, LittleEndian};
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::sample::{DisplayBuffer, SampleBuffer, SampleView};
use crate::window::{WindowLevel, WindowMapper};

/// Transform engine owning its scratch pool.
#[derive(Debug)]
pub struct IntensityTransform {
    parallel_threshold: usize,
    workers: usize,
    pool: BufferPool,
}

impl IntensityTransform {
    /// Create an engine from pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            parallel_threshold: config.parallel_threshold,
            workers: config.max_parallel.max(1),
            pool: BufferPool::new(config.pool_max_per_class),
        }
    }

    /// Override the number of chunks used on the parallel path.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Override the pixel count at which the parallel path kicks in.
    pub fn parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Scratch pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Map a frame to display bytes, choosing the execution strategy by size.
    pub fn transform(&self, buffer: &SampleBuffer, window: WindowLevel) -> Result<DisplayBuffer> {
        let chunks = if buffer.pixel_count() >= self.parallel_threshold {
            self.workers
        } else {
            1
        };
        self.transform_with_chunks(buffer, window, chunks)
    }

    /// Map a frame on the calling thread.
    pub fn transform_sequential(
        &self,
        buffer: &SampleBuffer,
        window: WindowLevel,
    ) -> Result<DisplayBuffer> {
        self.transform_with_chunks(buffer, window, 1)
    }

    /// Map a frame using exactly `chunks` contiguous partitions.
    ///
    /// `chunks` is clamped to `1..=pixel_count`. Each chunk holds
    /// `ceil(pixel_count / chunks)` pixels; the last one is truncated.
    pub fn transform_with_chunks(
        &self,
        buffer: &SampleBuffer,
        window: WindowLevel,
        chunks: usize,
    ) -> Result<DisplayBuffer> {
        let mapper = window.mapper()?;
        let samples = buffer.view()?;
        let pixel_count = samples.len();

        if pixel_count == 0 {
            return Ok(Vec::new());
        }

        let rescale = Rescale {
            slope: buffer.rescale_slope,
            intercept: buffer.rescale_intercept,
        };
        let chunks = chunks.clamp(1, pixel_count);
        let chunk_len = pixel_count.div_ceil(chunks);

        let mut scratch = self.pool.acquire(pixel_count);

        if chunks == 1 {
            log::trace!("transform: {} pixels sequential", pixel_count);
            fill_range(samples, rescale, &mapper, &mut scratch);
        } else {
            log::debug!(
                "transform: {} pixels in {} chunks of {}",
                pixel_count,
                chunks,
                chunk_len
            );
            scratch
                .par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(idx, out)| {
                    let start = idx * chunk_len;
                    let part = samples.range(start, start + out.len());
                    fill_range(part, rescale, &mapper, out);
                });
        }

        Ok(scratch.to_exact_vec())
    }
}

impl Default for IntensityTransform {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

/// Map a frame with a default-configured engine.
pub fn apply_window_level(buffer: &SampleBuffer, window: WindowLevel) -> Result<DisplayBuffer> {
    IntensityTransform::default().transform(buffer, window)
}

#[derive(Debug, Clone, Copy)]
struct Rescale {
    slope: f64,
    intercept: f64,
}

impl Rescale {
    #[inline]
    fn apply(&self, raw: i64) -> f64 {
        raw as f64 * self.slope + self.intercept
    }
}

// `samples` and `out` have the same length; both were sliced from ranges
// validated against the frame dimensions.
fn fill_range(samples: SampleView<'_>, rescale: Rescale, mapper: &WindowMapper, out: &mut [u8]) {
    debug_assert_eq!(samples.len(), out.len());

    match samples {
        SampleView::U8(src) => {
            for (dst, &raw) in out.iter_mut().zip(src) {
                *dst = mapper.map(rescale.apply(raw as i64));
            }
        }
        SampleView::U16(src) => {
            for (dst, raw) in out.iter_mut().zip(src.chunks_exact(2)) {
                *dst = mapper.map(rescale.apply(LittleEndian::read_u16(raw) as i64));
            }
        }
        SampleView::I16(src) => {
            for (dst, raw) in out.iter_mut().zip(src.chunks_exact(2)) {
                *dst = mapper.map(rescale.apply(LittleEndian::read_i16(raw) as i64));
            }
        }
    }
}

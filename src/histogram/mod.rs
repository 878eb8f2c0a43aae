//! Intensity histograms with thread-local accumulation.
//!
//! Large inputs are split into contiguous partitions. Each rayon job folds
//! the partitions it runs into one private bin array, and the arrays are
//! merged as jobs join. The hot loop never touches shared memory, and memory
//! use tracks the number of jobs rather than the number of partitions.

use byteorder::{ByteOrder, LittleEndian};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::sample::{SampleBuffer, SampleView};

/// Number of output bins.
pub const HISTOGRAM_BINS: usize = 256;

/// Number of bins for native 16-bit accumulation before reduction.
const WIDE_BINS: usize = 65_536;

/// Intensity distribution summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Histogram {
    /// Counts per bin.
    pub bins: Vec<u32>,
    /// Always [`HISTOGRAM_BINS`].
    pub bin_count: usize,
    /// First non-empty bin.
    pub min_value: usize,
    /// Last non-empty bin.
    pub max_value: usize,
    /// Largest bin count.
    pub peak_value: u32,
    /// Bin holding `peak_value`; the first one wins ties.
    pub peak_index: usize,
    /// Number of samples counted.
    pub total_samples: u64,
}

impl Histogram {
    /// Histogram of an empty input.
    pub fn empty() -> Self {
        Self {
            bins: vec![0; HISTOGRAM_BINS],
            bin_count: HISTOGRAM_BINS,
            min_value: 0,
            max_value: HISTOGRAM_BINS - 1,
            peak_value: 0,
            peak_index: 0,
            total_samples: 0,
        }
    }

    /// Build a histogram from final bin counts, deriving the statistics.
    pub fn from_bins(bins: [u32; HISTOGRAM_BINS]) -> Self {
        let total_samples: u64 = bins.iter().map(|&b| b as u64).sum();
        if total_samples == 0 {
            return Self::empty();
        }

        let mut min_value = HISTOGRAM_BINS - 1;
        let mut max_value = 0;
        let mut peak_value = 0;
        let mut peak_index = 0;

        for (i, &count) in bins.iter().enumerate() {
            if count == 0 {
                continue;
            }
            min_value = min_value.min(i);
            max_value = i;
            if count > peak_value {
                peak_value = count;
                peak_index = i;
            }
        }

        Self {
            bins: bins.to_vec(),
            bin_count: HISTOGRAM_BINS,
            min_value,
            max_value,
            peak_value,
            peak_index,
            total_samples,
        }
    }

    /// Whether no samples were counted.
    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// Bins divided by the peak count; all zero when the peak is zero.
    pub fn normalized_bins(&self) -> Vec<f64> {
        if self.peak_value == 0 {
            return vec![0.0; self.bin_count];
        }
        let peak = self.peak_value as f64;
        self.bins.iter().map(|&b| b as f64 / peak).collect()
    }

    /// Count used to scale a plot, ignoring the top 1% of bins.
    ///
    /// A handful of dominant bins (air, padding) would otherwise flatten the
    /// rest of the curve.
    pub fn display_max(&self) -> u32 {
        let mut sorted = self.bins.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        let clip = (self.bin_count / 100).max(1);
        sorted.get(clip).copied().unwrap_or(0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::empty()
    }
}

/// Histogram engine with a configurable parallel strategy.
#[derive(Debug, Clone)]
pub struct HistogramEngine {
    parallel_threshold: usize,
    workers: usize,
}

impl HistogramEngine {
    /// Create an engine from pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            parallel_threshold: config.parallel_threshold,
            workers: config.max_parallel.max(1),
        }
    }

    /// Override the number of partitions on the parallel path.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    fn chunks_for(&self, len: usize) -> usize {
        if len >= self.parallel_threshold {
            self.workers
        } else {
            1
        }
    }

    /// Histogram of an 8-bit display buffer.
    pub fn compute(&self, pixels: &[u8]) -> Histogram {
        self.compute_with_chunks(pixels, self.chunks_for(pixels.len()))
    }

    /// Histogram of an 8-bit display buffer using exactly `chunks` partitions.
    pub fn compute_with_chunks(&self, pixels: &[u8], chunks: usize) -> Histogram {
        if pixels.is_empty() {
            return Histogram::empty();
        }
        Histogram::from_bins(accumulate(SampleView::U8(pixels), chunks))
    }

    /// Histogram of native samples, reduced to 256 bins.
    ///
    /// An empty frame yields [`Histogram::empty`]; a frame whose sample
    /// length disagrees with its dimensions is an error.
    pub fn compute_samples(&self, buffer: &SampleBuffer) -> Result<Histogram> {
        self.compute_samples_with_chunks(buffer, self.chunks_for(buffer.pixel_count()))
    }

    /// Native-sample histogram using exactly `chunks` partitions.
    pub fn compute_samples_with_chunks(
        &self,
        buffer: &SampleBuffer,
        chunks: usize,
    ) -> Result<Histogram> {
        if buffer.is_empty() {
            return Ok(Histogram::empty());
        }
        let view = buffer.view()?;
        Ok(Histogram::from_bins(accumulate(view, chunks)))
    }
}

impl Default for HistogramEngine {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

/// Histogram of a display buffer with default settings.
pub fn histogram(pixels: &[u8]) -> Histogram {
    HistogramEngine::default().compute(pixels)
}

/// Histogram of native samples with default settings.
pub fn sample_histogram(buffer: &SampleBuffer) -> Result<Histogram> {
    HistogramEngine::default().compute_samples(buffer)
}

fn accumulate(view: SampleView<'_>, chunks: usize) -> [u32; HISTOGRAM_BINS] {
    let len = view.len();
    let chunks = chunks.clamp(1, len.max(1));

    if chunks == 1 {
        return match view {
            SampleView::U8(src) => count_narrow(src),
            wide => reduce_wide(&count_wide(wide)),
        };
    }

    let chunk_len = len.div_ceil(chunks);
    let ranges: Vec<(usize, usize)> = (0..len)
        .step_by(chunk_len)
        .map(|start| (start, (start + chunk_len).min(len)))
        .collect();

    match view {
        SampleView::U8(src) => ranges
            .par_iter()
            .fold(
                || [0u32; HISTOGRAM_BINS],
                |mut local, &(start, end)| {
                    for &value in &src[start..end] {
                        local[value as usize] += 1;
                    }
                    local
                },
            )
            .reduce(|| [0u32; HISTOGRAM_BINS], merge),
        _ => ranges
            .par_iter()
            .fold(
                || vec![0u32; WIDE_BINS],
                |mut local, &(start, end)| {
                    tally_wide(&mut local, view.range(start, end));
                    local
                },
            )
            .map(|local| reduce_wide(&local))
            .reduce(|| [0u32; HISTOGRAM_BINS], merge),
    }
}

fn merge(mut a: [u32; HISTOGRAM_BINS], b: [u32; HISTOGRAM_BINS]) -> [u32; HISTOGRAM_BINS] {
    for (bin, count) in a.iter_mut().zip(b) {
        *bin += count;
    }
    a
}

fn count_narrow(src: &[u8]) -> [u32; HISTOGRAM_BINS] {
    let mut local = [0u32; HISTOGRAM_BINS];
    for &value in src {
        local[value as usize] += 1;
    }
    local
}

fn count_wide(view: SampleView<'_>) -> Vec<u32> {
    let mut local = vec![0u32; WIDE_BINS];
    tally_wide(&mut local, view);
    local
}

// Signed samples are offset by 32768 so the full i16 range lands in 0..65536.
fn tally_wide(local: &mut [u32], view: SampleView<'_>) {
    match view {
        SampleView::U16(src) => {
            for raw in src.chunks_exact(2) {
                local[LittleEndian::read_u16(raw) as usize] += 1;
            }
        }
        SampleView::I16(src) => {
            for raw in src.chunks_exact(2) {
                let value = LittleEndian::read_i16(raw) as i32 + 32_768;
                local[value as usize] += 1;
            }
        }
        SampleView::U8(src) => {
            for &value in src {
                local[value as usize] += 1;
            }
        }
    }
}

fn reduce_wide(wide: &[u32]) -> [u32; HISTOGRAM_BINS] {
    let mut bins = [0u32; HISTOGRAM_BINS];
    for (i, &count) in wide.iter().enumerate() {
        bins[i >> 8] += count;
    }
    bins
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_conserved(h: &Histogram) {
        let sum: u64 = h.bins.iter().map(|&b| b as u64).sum();
        assert_eq!(sum, h.total_samples);
    }

    #[test]
    fn test_uniform_buffer() {
        let h = histogram(&[100, 100, 100, 100]);
        assert_eq!(h.bins[100], 4);
        assert_eq!(h.bins.iter().filter(|&&b| b > 0).count(), 1);
        assert_eq!(h.min_value, 100);
        assert_eq!(h.max_value, 100);
        assert_eq!(h.peak_index, 100);
        assert_eq!(h.peak_value, 4);
        assert_eq!(h.total_samples, 4);
    }

    #[test]
    fn test_empty_inputs() {
        let h = histogram(&[]);
        assert_eq!(h, Histogram::empty());
        assert_eq!(h.min_value, 0);
        assert_eq!(h.max_value, 255);
        assert_eq!(h.peak_value, 0);
        assert_eq!(h.peak_index, 0);
        assert_eq!(h.total_samples, 0);

        let empty = SampleBuffer::from_u8(0, 0, Vec::new());
        assert_eq!(sample_histogram(&empty).unwrap(), Histogram::empty());

        let declared_but_missing = SampleBuffer::from_u16(4, 4, &[]);
        assert_eq!(sample_histogram(&declared_but_missing).unwrap(), Histogram::empty());
    }

    #[test]
    fn test_statistics() {
        let h = histogram(&[3, 7, 7, 200, 3, 9]);
        assert_eq!(h.min_value, 3);
        assert_eq!(h.max_value, 200);
        // bins 3 and 7 both hold 2; the first wins
        assert_eq!(h.peak_value, 2);
        assert_eq!(h.peak_index, 3);
        assert_conserved(&h);
    }

    #[test]
    fn test_sixteen_bit_reduction() {
        let buffer = SampleBuffer::from_u16(4, 1, &[0, 255, 256, 65535]);
        let h = sample_histogram(&buffer).unwrap();
        assert_eq!(h.bins[0], 2);
        assert_eq!(h.bins[1], 1);
        assert_eq!(h.bins[255], 1);
        assert_eq!(h.total_samples, 4);
    }

    #[test]
    fn test_signed_offset() {
        let buffer = SampleBuffer::from_i16(3, 1, &[i16::MIN, -1, 0]);
        let h = sample_histogram(&buffer).unwrap();
        // -32768 -> 0, -1 -> 32767 -> bin 127, 0 -> 32768 -> bin 128
        assert_eq!(h.bins[0], 1);
        assert_eq!(h.bins[127], 1);
        assert_eq!(h.bins[128], 1);
        assert_eq!(h.min_value, 0);
        assert_eq!(h.max_value, 128);
    }

    #[test]
    fn test_eight_bit_samples_use_identity_bins() {
        let buffer = SampleBuffer::from_u8(2, 2, vec![1, 2, 2, 250]);
        let h = sample_histogram(&buffer).unwrap();
        assert_eq!(h.bins[2], 2);
        assert_eq!(h.bins[250], 1);
        assert_eq!(h, histogram(&buffer.raw_samples));
    }

    #[test]
    fn test_mismatched_sample_buffer() {
        let buffer = SampleBuffer::from_u8(4, 4, vec![0; 10]);
        assert!(sample_histogram(&buffer).is_err());
    }

    #[test]
    fn test_parallel_equivalence_display() {
        let pixels: Vec<u8> = (0..10_007u32).map(|i| (i * 31 % 251) as u8).collect();
        let engine = HistogramEngine::default();
        let expected = engine.compute_with_chunks(&pixels, 1);
        for chunks in [2, 3, 8, 1000, pixels.len()] {
            let h = engine.compute_with_chunks(&pixels, chunks);
            assert_eq!(h, expected, "mismatch with {} chunks", chunks);
        }
        assert_conserved(&expected);
    }

    #[test]
    fn test_parallel_equivalence_samples() {
        let samples: Vec<i16> = (0..4099i32).map(|i| (i * 97 % 60000 - 30000) as i16).collect();
        let buffer = SampleBuffer::from_i16(4099, 1, &samples);
        let engine = HistogramEngine::default();
        let expected = engine.compute_samples_with_chunks(&buffer, 1).unwrap();
        for chunks in [2, 5, 64, 4099] {
            let h = engine.compute_samples_with_chunks(&buffer, chunks).unwrap();
            assert_eq!(h, expected, "mismatch with {} chunks", chunks);
        }
        assert_eq!(expected.total_samples, 4099);
        assert_conserved(&expected);
    }

    #[test]
    fn test_one_partition_per_sample_on_full_frame() {
        let samples: Vec<u16> = (0..512 * 512u32).map(|i| (i * 7 % 65_536) as u16).collect();
        let buffer = SampleBuffer::from_u16(512, 512, &samples);
        let engine = HistogramEngine::default();

        let expected = engine.compute_samples_with_chunks(&buffer, 1).unwrap();
        let h = engine
            .compute_samples_with_chunks(&buffer, buffer.pixel_count())
            .unwrap();
        assert_eq!(h, expected);
        assert_eq!(h.total_samples, 512 * 512);
        assert_conserved(&h);

        let pixels: Vec<u8> = samples.iter().map(|&s| (s >> 8) as u8).collect();
        assert_eq!(engine.compute_with_chunks(&pixels, pixels.len()), expected);
    }

    #[test]
    fn test_large_frame_parallel_path() {
        let pixels: Vec<u8> = (0..512 * 512).map(|i| (i % 256) as u8).collect();
        let h = HistogramEngine::default().workers(4).compute(&pixels);
        assert!(h.bins.iter().all(|&b| b == 1024));
        assert_eq!(h.total_samples, 512 * 512);
        assert_eq!(h.peak_index, 0);
    }

    #[test]
    fn test_normalized_bins() {
        let h = histogram(&[10, 10, 20]);
        let norm = h.normalized_bins();
        assert_eq!(norm[10], 1.0);
        assert_eq!(norm[20], 0.5);
        assert_eq!(norm[0], 0.0);

        assert!(Histogram::empty().normalized_bins().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_display_max_clips_dominant_bin() {
        let mut pixels = vec![0u8; 1000];
        pixels.extend(std::iter::repeat(128u8).take(40));
        pixels.extend(std::iter::repeat(129u8).take(30));
        let h = histogram(&pixels);
        assert_eq!(h.peak_value, 1000);
        // 256 / 100 = 2: skip the two largest bins
        assert_eq!(h.display_max(), 30);
    }
}

//! Decoded sample buffers.
//!
//! A [`SampleBuffer`] is one grayscale frame as handed over by the DICOM
//! decoder: dimensions, storage format, rescale coefficients and the raw
//! little-endian sample bytes.

use crate::error::{RenderError, Result};

/// One byte per pixel, intensity 0-255, row-major.
pub type DisplayBuffer = Vec<u8>;

/// Storage width of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    /// 8 bits allocated
    Eight,
    /// 16 bits allocated
    Sixteen,
}

impl BitDepth {
    /// Parse a DICOM Bits Allocated value.
    pub fn from_bits_allocated(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => Err(RenderError::InvalidBuffer(format!(
                "Unsupported bits allocated: {} (expected 8 or 16)",
                other
            ))),
        }
    }

    /// Bytes per stored sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Sixteen => 2,
        }
    }
}

/// A decoded single-channel frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
    /// Storage width per sample (8 or 16).
    pub bits_allocated: u16,
    /// Significant bits; informational only.
    pub bits_stored: u16,
    /// Whether 16-bit samples are two's complement.
    pub is_signed: bool,
    /// Rescale slope.
    pub rescale_slope: f64,
    /// Rescale intercept.
    pub rescale_intercept: f64,
    /// Raw little-endian sample bytes.
    pub raw_samples: Vec<u8>,
}

impl SampleBuffer {
    /// Unsigned 8-bit frame with an identity rescale.
    pub fn from_u8(width: u32, height: u32, samples: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bits_allocated: 8,
            bits_stored: 8,
            is_signed: false,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            raw_samples: samples,
        }
    }

    /// Unsigned 16-bit frame with an identity rescale.
    pub fn from_u16(width: u32, height: u32, samples: &[u16]) -> Self {
        Self {
            bits_allocated: 16,
            bits_stored: 16,
            raw_samples: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            ..Self::from_u8(width, height, Vec::new())
        }
    }

    /// Signed 16-bit frame with an identity rescale.
    pub fn from_i16(width: u32, height: u32, samples: &[i16]) -> Self {
        Self {
            bits_allocated: 16,
            bits_stored: 16,
            is_signed: true,
            raw_samples: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            ..Self::from_u8(width, height, Vec::new())
        }
    }

    /// Set the rescale coefficients.
    pub fn with_rescale(mut self, slope: f64, intercept: f64) -> Self {
        self.rescale_slope = slope;
        self.rescale_intercept = intercept;
        self
    }

    /// Number of pixels declared by the dimensions.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the frame holds no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0 || self.raw_samples.is_empty()
    }

    /// Parsed storage width.
    pub fn bit_depth(&self) -> Result<BitDepth> {
        BitDepth::from_bits_allocated(self.bits_allocated)
    }

    /// Sample byte length implied by dimensions and bit depth.
    pub fn expected_len(&self) -> Result<usize> {
        Ok(self.pixel_count() * self.bit_depth()?.bytes_per_sample())
    }

    /// Check the length invariant and return a typed view over the samples.
    pub fn view(&self) -> Result<SampleView<'_>> {
        let expected = self.expected_len()?;
        if self.raw_samples.len() != expected {
            return Err(RenderError::InvalidBuffer(format!(
                "Sample data size mismatch for {}x{} at {} bits: expected {} bytes, got {}",
                self.width,
                self.height,
                self.bits_allocated,
                expected,
                self.raw_samples.len()
            )));
        }

        let bytes = self.raw_samples.as_slice();
        Ok(match (self.bit_depth()?, self.is_signed) {
            (BitDepth::Eight, _) => SampleView::U8(bytes),
            (BitDepth::Sixteen, false) => SampleView::U16(bytes),
            (BitDepth::Sixteen, true) => SampleView::I16(bytes),
        })
    }

    /// Validate the length invariant.
    pub fn validate(&self) -> Result<()> {
        self.view().map(|_| ())
    }
}

/// Length-checked view over raw sample bytes, tagged with their format.
#[derive(Debug, Clone, Copy)]
pub enum SampleView<'a> {
    /// One byte per sample.
    U8(&'a [u8]),
    /// Two little-endian bytes per unsigned sample.
    U16(&'a [u8]),
    /// Two little-endian bytes per signed sample.
    I16(&'a [u8]),
}

impl<'a> SampleView<'a> {
    /// Number of samples in the view.
    pub fn len(&self) -> usize {
        match self {
            SampleView::U8(b) => b.len(),
            SampleView::U16(b) | SampleView::I16(b) => b.len() / 2,
        }
    }

    /// Whether the view holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sub-view over samples `start..end`.
    pub fn range(&self, start: usize, end: usize) -> SampleView<'a> {
        match *self {
            SampleView::U8(b) => SampleView::U8(&b[start..end]),
            SampleView::U16(b) => SampleView::U16(&b[start * 2..end * 2]),
            SampleView::I16(b) => SampleView::I16(&b[start * 2..end * 2]),
        }
    }
}

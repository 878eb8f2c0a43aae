//! DICOM frame loading.
//!
//! The rendering stages never parse files themselves; they ask a
//! [`FrameSource`] for a decoded [`SampleBuffer`] and the frame's own window.
//! [`DicomLoader`] is the file-backed implementation. It only handles
//! uncompressed little-endian grayscale data and reads the first frame of
//! multi-frame objects.

use std::path::Path;

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject};
use serde::Serialize;

use crate::error::{RenderError, Result};
use crate::sample::{BitDepth, SampleBuffer};
use crate::window::WindowLevel;

/// Implicit VR Little Endian.
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
/// Explicit VR Little Endian.
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// Supplies decoded frames and their default windows.
pub trait FrameSource: Send + Sync {
    /// Decode the first frame of `path`.
    fn load(&self, path: &Path) -> Result<SampleBuffer>;

    /// Window stored with `path`, or the fallback when it has none.
    fn default_window_level(&self, path: &Path) -> Result<WindowLevel>;

    /// Frame and window in one call.
    fn load_with_window(&self, path: &Path) -> Result<(SampleBuffer, WindowLevel)> {
        Ok((self.load(path)?, self.default_window_level(path)?))
    }
}

/// Header fields describing a frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameMetadata {
    /// Patient ID.
    pub patient_id: Option<String>,
    /// Modality code (CT, MR, ...).
    pub modality: Option<String>,
    /// Series description.
    pub series_description: Option<String>,
    /// Transfer syntax UID, without padding.
    pub transfer_syntax: String,
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
    /// Bits allocated per sample.
    pub bits_allocated: u16,
    /// Bits stored per sample.
    pub bits_stored: u16,
    /// Pixel representation (0 = unsigned, 1 = signed).
    pub pixel_representation: u16,
    /// Samples per pixel.
    pub samples_per_pixel: u16,
    /// Photometric interpretation.
    pub photometric_interpretation: String,
    /// Number of frames in the object.
    pub number_of_frames: u32,
    /// Rescale slope (1 when absent).
    pub rescale_slope: f64,
    /// Rescale intercept (0 when absent).
    pub rescale_intercept: f64,
    /// Window stored in the header, if valid.
    pub window: Option<WindowLevel>,
}

/// A decoded frame together with its header.
#[derive(Debug, Clone)]
pub struct DicomFrame {
    /// Header fields.
    pub metadata: FrameMetadata,
    /// First frame's samples.
    pub buffer: SampleBuffer,
}

impl DicomFrame {
    /// Stored window, falling back to `fallback`.
    pub fn window_or(&self, fallback: WindowLevel) -> WindowLevel {
        self.metadata.window.unwrap_or(fallback)
    }
}

/// Reads frames from DICOM files on disk.
#[derive(Debug, Clone)]
pub struct DicomLoader {
    fallback_window: WindowLevel,
}

impl Default for DicomLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DicomLoader {
    /// Loader falling back to the 400/40 window.
    pub fn new() -> Self {
        Self {
            fallback_window: WindowLevel::DEFAULT,
        }
    }

    /// Use a different window for files that carry none.
    pub fn fallback_window(mut self, window: WindowLevel) -> Self {
        self.fallback_window = window;
        self
    }

    /// Open a file and decode its first frame.
    pub fn open(&self, path: &Path) -> Result<DicomFrame> {
        let object = open_file(path).map_err(|e| {
            RenderError::DecodeFailure(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let metadata = Self::extract_metadata(&object)?;
        let buffer = Self::first_frame(&object, &metadata)?;
        log::debug!(
            "loaded {}: {}x{} {}-bit {}",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.bits_allocated,
            if buffer.is_signed { "signed" } else { "unsigned" }
        );
        Ok(DicomFrame { metadata, buffer })
    }

    fn extract_metadata(obj: &DefaultDicomObject) -> Result<FrameMetadata> {
        let get_string = |tag: Tag| -> Option<String> {
            obj.element(tag)
                .ok()
                .and_then(|e| e.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let get_u16 =
            |tag: Tag| -> Option<u16> { obj.element(tag).ok().and_then(|e| e.to_int::<u16>().ok()) };

        let get_f64 = |tag: Tag| -> Option<f64> {
            obj.element(tag)
                .ok()
                .and_then(|e| e.to_multi_float64().ok())
                .and_then(|values| values.first().copied())
        };

        let transfer_syntax = supported_transfer_syntax(obj.meta().transfer_syntax())?;

        let width = get_u16(tags::COLUMNS)
            .ok_or_else(|| RenderError::DecodeFailure("Missing Columns tag".into()))?
            as u32;
        let height = get_u16(tags::ROWS)
            .ok_or_else(|| RenderError::DecodeFailure("Missing Rows tag".into()))?
            as u32;
        let bits_allocated = get_u16(tags::BITS_ALLOCATED)
            .ok_or_else(|| RenderError::DecodeFailure("Missing BitsAllocated tag".into()))?;
        let bits_stored = get_u16(tags::BITS_STORED).unwrap_or(bits_allocated);

        let samples_per_pixel = get_u16(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
        if samples_per_pixel != 1 {
            return Err(RenderError::DecodeFailure(format!(
                "Only single-channel images are supported, got {} samples per pixel",
                samples_per_pixel
            )));
        }

        let number_of_frames = get_string(tags::NUMBER_OF_FRAMES)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1);

        let window = match (get_f64(tags::WINDOW_WIDTH), get_f64(tags::WINDOW_CENTER)) {
            (Some(width), Some(center)) => {
                let window = WindowLevel::new(width, center);
                window.validate().ok().map(|_| window)
            }
            _ => None,
        };

        Ok(FrameMetadata {
            patient_id: get_string(tags::PATIENT_ID),
            modality: get_string(tags::MODALITY),
            series_description: get_string(tags::SERIES_DESCRIPTION),
            transfer_syntax,
            width,
            height,
            bits_allocated,
            bits_stored,
            pixel_representation: get_u16(tags::PIXEL_REPRESENTATION).unwrap_or(0),
            samples_per_pixel,
            photometric_interpretation: get_string(tags::PHOTOMETRIC_INTERPRETATION)
                .unwrap_or_else(|| "MONOCHROME2".into()),
            number_of_frames,
            rescale_slope: get_f64(tags::RESCALE_SLOPE).unwrap_or(1.0),
            rescale_intercept: get_f64(tags::RESCALE_INTERCEPT).unwrap_or(0.0),
            window,
        })
    }

    fn first_frame(obj: &DefaultDicomObject, metadata: &FrameMetadata) -> Result<SampleBuffer> {
        let depth = BitDepth::from_bits_allocated(metadata.bits_allocated)
            .map_err(|e| RenderError::DecodeFailure(e.to_string()))?;

        let element = obj
            .element(tags::PIXEL_DATA)
            .map_err(|_| RenderError::DecodeFailure("Missing PixelData element".into()))?;
        let bytes = element.to_bytes().map_err(|e| {
            RenderError::DecodeFailure(format!("Failed to extract pixel data: {}", e))
        })?;

        let frame_len =
            metadata.width as usize * metadata.height as usize * depth.bytes_per_sample();
        if bytes.len() < frame_len {
            return Err(RenderError::DecodeFailure(format!(
                "Pixel data too short: expected at least {} bytes, got {}",
                frame_len,
                bytes.len()
            )));
        }

        Ok(SampleBuffer {
            width: metadata.width,
            height: metadata.height,
            bits_allocated: metadata.bits_allocated,
            bits_stored: metadata.bits_stored,
            is_signed: metadata.pixel_representation == 1,
            rescale_slope: metadata.rescale_slope,
            rescale_intercept: metadata.rescale_intercept,
            raw_samples: bytes[..frame_len].to_vec(),
        })
    }
}

impl FrameSource for DicomLoader {
    fn load(&self, path: &Path) -> Result<SampleBuffer> {
        Ok(self.open(path)?.buffer)
    }

    fn default_window_level(&self, path: &Path) -> Result<WindowLevel> {
        Ok(self.open(path)?.window_or(self.fallback_window))
    }

    fn load_with_window(&self, path: &Path) -> Result<(SampleBuffer, WindowLevel)> {
        let frame = self.open(path)?;
        let window = frame.window_or(self.fallback_window);
        Ok((frame.buffer, window))
    }
}

// UIDs in the file meta group may be padded with NUL or space.
fn supported_transfer_syntax(raw: &str) -> Result<String> {
    let uid = raw.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    match uid {
        IMPLICIT_VR_LITTLE_ENDIAN | EXPLICIT_VR_LITTLE_ENDIAN => Ok(uid.to_string()),
        other => Err(RenderError::DecodeFailure(format!(
            "Unsupported transfer syntax: {} ({})",
            other,
            transfer_syntax_name(other)
        ))),
    }
}

/// Human-readable name for a transfer syntax UID.
pub fn transfer_syntax_name(ts: &str) -> &'static str {
    match ts {
        IMPLICIT_VR_LITTLE_ENDIAN => "Implicit VR Little Endian",
        EXPLICIT_VR_LITTLE_ENDIAN => "Explicit VR Little Endian",
        "1.2.840.10008.1.2.2" => "Explicit VR Big Endian",
        "1.2.840.10008.1.2.4.50" => "JPEG Baseline",
        "1.2.840.10008.1.2.4.70" => "JPEG Lossless",
        "1.2.840.10008.1.2.4.80" => "JPEG-LS Lossless",
        "1.2.840.10008.1.2.4.90" => "JPEG 2000 Lossless",
        "1.2.840.10008.1.2.4.91" => "JPEG 2000",
        "1.2.840.10008.1.2.5" => "RLE Lossless",
        _ => "Unknown",
    }
}

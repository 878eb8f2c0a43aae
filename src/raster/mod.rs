//! Minimal 8-bit grayscale PNG writer.
//!
//! Output is a signature followed by exactly three chunks: `IHDR`, one
//! `IDAT` holding the whole zlib stream, and `IEND`. Every scanline uses
//! filter type 0. The zlib framing (header and Adler-32 trailer) is written
//! here around a raw DEFLATE body from flate2.

mod checksum;

pub use checksum::{adler32, Crc32};

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;

use crate::config::CompressionLevel;
use crate::error::{RenderError, Result};

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// zlib header: 32K window, deflate, default-level flag.
const ZLIB_HEADER: [u8; 2] = [0x78, 0x9C];

// PNG limits dimensions to 2^31 - 1.
const MAX_DIMENSION: u32 = i32::MAX as u32;

/// Grayscale PNG encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder {
    compression: CompressionLevel,
}

impl PngEncoder {
    /// Create an encoder with the given DEFLATE effort.
    pub fn new(compression: CompressionLevel) -> Self {
        Self { compression }
    }

    /// Encode `width * height` display bytes as a PNG.
    pub fn encode(&self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        if width == 0 || height == 0 {
            return Err(RenderError::Encoding(format!(
                "Image dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(RenderError::Encoding(format!(
                "Image dimensions {}x{} exceed the PNG limit",
                width, height
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| RenderError::Encoding("Image dimensions overflow".into()))?;
        if pixels.len() != expected {
            return Err(RenderError::Encoding(format!(
                "Pixel count mismatch for {}x{}: expected {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        let idat = self.zlib_stream(pixels, width as usize)?;

        let mut out = Vec::with_capacity(PNG_SIGNATURE.len() + idat.len() + 3 * 12 + 13);
        out.extend_from_slice(&PNG_SIGNATURE);
        write_chunk(&mut out, b"IHDR", &ihdr(width, height)?)?;
        write_chunk(&mut out, b"IDAT", &idat)?;
        write_chunk(&mut out, b"IEND", &[])?;

        log::trace!(
            "png: {}x{} -> {} bytes ({} compressed)",
            width,
            height,
            out.len(),
            idat.len()
        );
        Ok(out)
    }

    fn zlib_stream(&self, pixels: &[u8], width: usize) -> Result<Vec<u8>> {
        let mut filtered = Vec::with_capacity(pixels.len() + pixels.len() / width);
        for row in pixels.chunks_exact(width) {
            filtered.push(0);
            filtered.extend_from_slice(row);
        }

        // The encoder appends raw DEFLATE after the header already in its sink.
        let mut encoder = DeflateEncoder::new(ZLIB_HEADER.to_vec(), self.compression.to_flate2());
        encoder
            .write_all(&filtered)
            .map_err(|e| RenderError::Encoding(e.to_string()))?;
        let mut stream = encoder
            .finish()
            .map_err(|e| RenderError::Encoding(e.to_string()))?;
        stream.write_u32::<BigEndian>(adler32(&filtered))?;
        Ok(stream)
    }
}

/// Encode with the fastest compression setting.
pub fn encode_grayscale(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    PngEncoder::default().encode(pixels, width, height)
}

fn ihdr(width: u32, height: u32) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(13);
    data.write_u32::<BigEndian>(width)?;
    data.write_u32::<BigEndian>(height)?;
    // bit depth 8, grayscale, deflate, filter method 0, no interlace
    data.extend_from_slice(&[8, 0, 0, 0, 0]);
    Ok(data)
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| RenderError::Encoding(format!("Chunk too large: {} bytes", data.len())))?;
    out.write_u32::<BigEndian>(len)?;
    out.extend_from_slice(kind);
    out.extend_from_slice(data);

    let mut crc = Crc32::new();
    crc.update(kind);
    crc.update(data);
    out.write_u32::<BigEndian>(crc.finalize())?;
    Ok(())
}

//! Single-frame rendering pipeline.
//!
//! Ties the stages together for one frame: samples are windowed into a
//! display buffer, which is then summarised as a histogram and, on request,
//! encoded as PNG.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::dicom::{DicomLoader, FrameMetadata};
use crate::error::Result;
use crate::histogram::{Histogram, HistogramEngine};
use crate::raster::PngEncoder;
use crate::sample::{DisplayBuffer, SampleBuffer};
use crate::thumbnail::downsample;
use crate::transform::IntensityTransform;
use crate::window::WindowLevel;

/// A frame mapped to display intensities.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    /// Source file, when rendered from disk.
    pub source_path: Option<PathBuf>,
    /// Header of the source file, when rendered from disk.
    pub metadata: Option<FrameMetadata>,
    /// Display bytes, `width * height`.
    pub pixels: DisplayBuffer,
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
    /// Window that produced `pixels`.
    pub window: WindowLevel,
    /// Histogram of `pixels`.
    pub histogram: Histogram,
    /// Time spent windowing and summarising, in milliseconds.
    pub render_time_ms: u64,
}

/// Rendering pipeline for single frames.
pub struct RenderPipeline {
    config: PipelineConfig,
    transform: IntensityTransform,
    histogram: HistogramEngine,
    encoder: PngEncoder,
    loader: DicomLoader,
}

impl RenderPipeline {
    /// Create a pipeline with the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            transform: IntensityTransform::new(&config),
            histogram: HistogramEngine::new(&config),
            encoder: PngEncoder::new(config.compression),
            loader: DicomLoader::new().fallback_window(config.default_window),
            config,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Window a frame and compute its display histogram.
    pub fn render(&self, buffer: &SampleBuffer, window: WindowLevel) -> Result<RenderedFrame> {
        let start = Instant::now();
        let pixels = self.transform.transform(buffer, window)?;
        let histogram = self.histogram.compute(&pixels);

        Ok(RenderedFrame {
            source_path: None,
            metadata: None,
            pixels,
            width: buffer.width,
            height: buffer.height,
            window,
            histogram,
            render_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Window a frame and encode it as PNG.
    pub fn render_png(&self, buffer: &SampleBuffer, window: WindowLevel) -> Result<Vec<u8>> {
        let pixels = self.transform.transform(buffer, window)?;
        self.encoder.encode(&pixels, buffer.width, buffer.height)
    }

    /// Load a file and render it. Without an explicit window the file's own
    /// window is used, then the configured default.
    pub fn render_file<P: AsRef<Path>>(
        &self,
        path: P,
        window: Option<WindowLevel>,
    ) -> Result<RenderedFrame> {
        let path = path.as_ref();
        log::info!("Rendering: {}", path.display());

        let frame = self.loader.open(path)?;
        let window = window.unwrap_or_else(|| frame.window_or(self.config.default_window));
        log::debug!("{}: window {}", path.display(), window);

        let mut rendered = self.render(&frame.buffer, window)?;
        rendered.source_path = Some(path.to_path_buf());
        rendered.metadata = Some(frame.metadata);
        Ok(rendered)
    }

    /// Encode an already rendered frame.
    pub fn encode(&self, frame: &RenderedFrame) -> Result<Vec<u8>> {
        self.encoder.encode(&frame.pixels, frame.width, frame.height)
    }

    /// Downsample an already rendered frame to a square thumbnail.
    pub fn thumbnail(&self, frame: &RenderedFrame, size: u32) -> Result<Vec<u8>> {
        downsample(&frame.pixels, frame.width, frame.height, size)
    }

    /// Histogram of a frame's native samples, before windowing.
    pub fn sample_histogram(&self, buffer: &SampleBuffer) -> Result<Histogram> {
        self.histogram.compute_samples(buffer)
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    #[test]
    fn test_render_computes_histogram() {
        let pipeline = RenderPipeline::default();
        let buffer = SampleBuffer::from_u8(2, 2, vec![0, 128, 255, 64]);
        let frame = pipeline.render(&buffer, WindowLevel::new(256.0, 128.0)).unwrap();

        assert_eq!(frame.pixels, vec![0, 127, 254, 63]);
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(frame.histogram.total_samples, 4);
        assert_eq!(frame.histogram.min_value, 0);
        assert_eq!(frame.histogram.max_value, 254);
        assert!(frame.source_path.is_none());
    }

    #[test]
    fn test_render_png_round_trip() {
        let pipeline = RenderPipeline::default();
        let buffer = SampleBuffer::from_i16(3, 2, &[-1000, -160, 40, 240, 1000, 0])
            .with_rescale(1.0, 0.0);
        let png = pipeline.render_png(&buffer, WindowLevel::DEFAULT).unwrap();

        let img = image::load_from_memory_with_format(&png, image::ImageFormat::Png).unwrap();
        let gray = img.as_luma8().unwrap();
        assert_eq!(gray.dimensions(), (3, 2));
        assert_eq!(gray.as_raw(), &vec![0u8, 0, 127, 255, 255, 102]);
    }

    #[test]
    fn test_encode_and_thumbnail_of_rendered_frame() {
        let pipeline = RenderPipeline::default();
        let buffer = SampleBuffer::from_u8(4, 4, (0..16).collect());
        let frame = pipeline.render(&buffer, WindowLevel::new(16.0, 8.0)).unwrap();

        let png = pipeline.encode(&frame).unwrap();
        assert_eq!(&png[..8], &crate::raster::PNG_SIGNATURE);

        let thumb = pipeline.thumbnail(&frame, 2).unwrap();
        assert_eq!(thumb, vec![frame.pixels[0], frame.pixels[2], frame.pixels[8], frame.pixels[10]]);
    }

    #[test]
    fn test_errors_propagate() {
        let pipeline = RenderPipeline::default();
        let bad = SampleBuffer::from_u8(2, 2, vec![0; 3]);
        assert!(matches!(
            pipeline.render(&bad, WindowLevel::DEFAULT),
            Err(RenderError::InvalidBuffer(_))
        ));

        let ok = SampleBuffer::from_u8(1, 1, vec![0]);
        assert!(matches!(
            pipeline.render_png(&ok, WindowLevel::new(-1.0, 0.0)),
            Err(RenderError::InvalidWindow(_))
        ));

        // Empty frames render to nothing but cannot be encoded.
        let empty = SampleBuffer::from_u8(0, 0, Vec::new());
        assert!(pipeline.render(&empty, WindowLevel::DEFAULT).unwrap().pixels.is_empty());
        assert!(matches!(
            pipeline.render_png(&empty, WindowLevel::DEFAULT),
            Err(RenderError::Encoding(_))
        ));
    }

    #[test]
    fn test_render_missing_file() {
        let pipeline = RenderPipeline::default();
        let result = pipeline.render_file("/nonexistent/slice.dcm", None);
        assert!(matches!(result, Err(RenderError::DecodeFailure(_))));
    }

    #[test]
    fn test_sample_histogram() {
        let pipeline = RenderPipeline::default();
        let buffer = SampleBuffer::from_u16(2, 1, &[0, 65535]);
        let h = pipeline.sample_histogram(&buffer).unwrap();
        assert_eq!(h.bins[0], 1);
        assert_eq!(h.bins[255], 1);
    }
}

//! Configuration for the rendering pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::window::WindowLevel;

/// Pixel count at which work is split across workers (one 512x512 frame).
pub const PARALLEL_PIXEL_THRESHOLD: usize = 512 * 512;

/// Default edge length of generated thumbnails.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 64;

/// DEFLATE effort used by the raster encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Fastest compression, largest output.
    #[default]
    Fast,
    /// zlib's default trade-off.
    Default,
    /// Smallest output.
    Best,
}

impl CompressionLevel {
    /// Map to the flate2 compression setting.
    pub fn to_flate2(self) -> flate2::Compression {
        match self {
            CompressionLevel::Fast => flate2::Compression::fast(),
            CompressionLevel::Default => flate2::Compression::default(),
            CompressionLevel::Best => flate2::Compression::best(),
        }
    }
}

/// Configuration shared by the transform, histogram and thumbnail stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pixel count at or above which the parallel paths are used.
    pub parallel_threshold: usize,
    /// Number of workers (chunks for a frame, threads for a batch).
    pub max_parallel: usize,
    /// Thumbnail edge length in pixels.
    pub thumbnail_size: u32,
    /// DEFLATE effort for PNG output.
    pub compression: CompressionLevel,
    /// Buffers retained per pool size class.
    pub pool_max_per_class: usize,
    /// Window used when a frame carries none.
    pub default_window: WindowLevel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: PARALLEL_PIXEL_THRESHOLD,
            max_parallel: num_cpus::get(),
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            compression: CompressionLevel::Fast,
            pool_max_per_class: 4,
            default_window: WindowLevel::DEFAULT,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|e| RenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RenderError::Config(e.to_string()))
    }

    /// Check invariants the stages rely on.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(RenderError::Config("max_parallel must be at least 1".into()));
        }
        if self.thumbnail_size == 0 {
            return Err(RenderError::Config("thumbnail_size must be at least 1".into()));
        }
        self.default_window
            .validate()
            .map_err(|e| RenderError::Config(format!("default_window: {}", e)))?;
        Ok(())
    }
}

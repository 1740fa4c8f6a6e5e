//! Configuration for mosaic stores.

use crate::downsample::DownsampleMethod;
use crate::error::{MosaicError, MosaicResult};
use serde::{Deserialize, Serialize};

/// Configuration for chunked mosaic output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MosaicConfig {
    /// Chunk dimension for Zarr arrays (square chunks, all bands per chunk).
    pub zarr_chunk_size: usize,

    /// Compression codec for Zarr arrays.
    pub zarr_compression: ZarrCompression,

    /// Compression level (1-9).
    pub zarr_compression_level: u8,

    /// Enable byte shuffle filter.
    pub zarr_shuffle: bool,

    /// Multi-resolution levels.
    pub pyramid: PyramidConfig,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            zarr_chunk_size: 512,
            zarr_compression: ZarrCompression::BloscZstd,
            zarr_compression_level: 1,
            zarr_shuffle: true,
            pyramid: PyramidConfig::default(),
        }
    }
}

impl MosaicConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ZARR_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                config.zarr_chunk_size = size;
            }
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            config.zarr_compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                config.zarr_compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            config.zarr_shuffle = val.to_lowercase() == "true" || val == "1";
        }

        config.pyramid = PyramidConfig::from_env();
        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> MosaicResult<()> {
        if self.zarr_chunk_size == 0 {
            return Err(MosaicError::Config("zarr_chunk_size must be > 0".to_string()));
        }

        if self.zarr_compression_level == 0 || self.zarr_compression_level > 9 {
            return Err(MosaicError::Config(
                "zarr_compression_level must be 1-9".to_string(),
            ));
        }

        self.pyramid.validate()
    }
}

/// Compression codec for Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// LZ4 compression.
    Lz4,
    /// Zstd compression.
    Zstd,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd (recommended).
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" => Self::Lz4,
            "zstd" => Self::Zstd,
            "blosc_lz4" => Self::BloscLz4,
            "blosc_zstd" => Self::BloscZstd,
            _ => Self::BloscZstd,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Pyramid Configuration
// ============================================================================

/// Configuration for multi-resolution pyramid generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyramidConfig {
    /// Whether to generate downsampled levels.
    pub enabled: bool,

    /// Stop generating levels when the smaller dimension falls below this value.
    pub min_dimension: usize,

    /// Downscale factor per level. Only 2 is supported.
    pub downscale_factor: usize,

    /// Downsampling method.
    pub method: DownsampleMethod,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_dimension: 256,
            downscale_factor: 2,
            method: DownsampleMethod::Mean,
        }
    }
}

impl PyramidConfig {
    /// Load pyramid configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PYRAMID_ENABLED") {
            config.enabled = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("PYRAMID_MIN_DIMENSION") {
            if let Ok(size) = val.parse() {
                config.min_dimension = size;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_DOWNSCALE_FACTOR") {
            if let Ok(factor) = val.parse() {
                config.downscale_factor = factor;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_DOWNSAMPLE_METHOD") {
            config.method = DownsampleMethod::from_str(&val);
        }

        config
    }

    /// Validate the pyramid configuration.
    pub fn validate(&self) -> MosaicResult<()> {
        if self.min_dimension == 0 {
            return Err(MosaicError::Config(
                "pyramid min_dimension must be > 0".to_string(),
            ));
        }

        if self.downscale_factor != 2 {
            return Err(MosaicError::Config(
                "pyramid downscale_factor must be 2".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of levels, level 0 included, for a `width` x `height` mosaic.
    ///
    /// A level is added while the next level's smaller dimension is still
    /// at least `min_dimension`.
    pub fn calculate_num_levels(&self, width: usize, height: usize) -> usize {
        if !self.enabled {
            return 1;
        }

        let mut levels = 1;
        let mut w = width;
        let mut h = height;

        loop {
            w /= self.downscale_factor;
            h /= self.downscale_factor;
            if w == 0 || h == 0 || w.min(h) < self.min_dimension {
                break;
            }
            levels += 1;
        }

        levels
    }
}

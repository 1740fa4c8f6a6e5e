//! Error types for mosaic assembly.

use thiserror::Error;
use tile_common::{Crs, ExtractError};

/// Errors that can occur while assembling or clipping a mosaic.
#[derive(Error, Debug)]
pub enum MosaicError {
    /// GeoTIFF encode/decode failure.
    #[error("GeoTIFF error: {0}")]
    GeoTiff(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    Zarr(String),

    /// A tile carries a different CRS than the run.
    #[error("tile {tile} has CRS {found}, expected {expected}")]
    CrsMismatch {
        tile: String,
        expected: Crs,
        found: Crs,
    },

    /// Boundary geometry unusable for clipping this mosaic.
    #[error("boundary error: {0}")]
    Boundary(String),

    /// Raster shape or content is unusable.
    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage/IO error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MosaicError {
    /// Create a Zarr error.
    pub fn zarr(msg: impl ToString) -> Self {
        Self::Zarr(msg.to_string())
    }

    /// Create a Boundary error.
    pub fn boundary(msg: impl ToString) -> Self {
        Self::Boundary(msg.to_string())
    }

    /// Create an InvalidRaster error.
    pub fn invalid_raster(msg: impl Into<String>) -> Self {
        Self::InvalidRaster(msg.into())
    }
}

impl From<tiff::TiffError> for MosaicError {
    fn from(err: tiff::TiffError) -> Self {
        Self::GeoTiff(err.to_string())
    }
}

impl From<serde_json::Error> for MosaicError {
    fn from(err: serde_json::Error) -> Self {
        Self::Zarr(format!("attribute encoding: {}", err))
    }
}

impl From<MosaicError> for ExtractError {
    fn from(err: MosaicError) -> Self {
        match err {
            MosaicError::CrsMismatch { .. } => ExtractError::DataIntegrity(err.to_string()),
            MosaicError::Boundary(msg) => ExtractError::DataIntegrity(msg),
            MosaicError::Config(msg) => ExtractError::Configuration(msg),
            MosaicError::Io(e) => ExtractError::Io(e),
            other => ExtractError::Raster(other.to_string()),
        }
    }
}

/// Result type for mosaic operations.
pub type MosaicResult<T> = std::result::Result<T, MosaicError>;

//! Error taxonomy for an extraction run.

use thiserror::Error;

/// Result type alias using ExtractError.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Primary error type for an extraction run.
///
/// Configuration errors are raised before any rendering starts; render and
/// storage errors abort the run where they occur.
#[derive(Debug, Error)]
pub enum ExtractError {
    // === Input Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    // === Stage Errors ===
    #[error("Render failed for {tile}: {message}")]
    Render { tile: String, message: String },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Raster error: {0}")]
    Raster(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a Render error attributed to a tile.
    pub fn render(tile: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Render {
            tile: tile.into(),
            message: msg.into(),
        }
    }

    /// Create a DataIntegrity error.
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Short category name used in logs and the exit message.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Configuration(_) => "ConfigurationError",
            ExtractError::Render { .. } => "RenderError",
            ExtractError::DataIntegrity(_) => "DataIntegrityError",
            ExtractError::Storage(_) => "StorageError",
            ExtractError::Raster(_) => "RasterError",
            ExtractError::Io(_) => "IoError",
        }
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        ExtractError::DataIntegrity(format!("JSON error: {}", err))
    }
}

impl From<crate::crs::CrsParseError> for ExtractError {
    fn from(err: crate::crs::CrsParseError) -> Self {
        ExtractError::Configuration(err.to_string())
    }
}

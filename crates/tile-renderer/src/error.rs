//! Render error types.

use std::time::Duration;
use thiserror::Error;
use tile_common::ExtractError;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render of {tile} failed: {message}")]
    Failed { tile: String, message: String },

    #[error("render of {tile} timed out after {timeout:?}")]
    Timeout { tile: String, timeout: Duration },

    #[error("renderer unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn failed(tile: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            tile: tile.into(),
            message: message.into(),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

impl From<RenderError> for ExtractError {
    fn from(err: RenderError) -> Self {
        let message = err.to_string();
        match err {
            RenderError::Failed { tile, message } => ExtractError::render(tile, message),
            RenderError::Timeout { tile, .. } => ExtractError::render(tile, message),
            RenderError::Unavailable(_) | RenderError::Io(_) => ExtractError::render("*", message),
        }
    }
}

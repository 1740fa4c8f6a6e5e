//! Storage error types.

use thiserror::Error;
use tile_common::ExtractError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid remote URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("failed to create storage client: {0}")]
    Client(String),

    #[error("{operation} {path} failed: {source}")]
    Backend {
        operation: &'static str,
        path: String,
        #[source]
        source: object_store::Error,
    },

    #[error("cannot walk {0}")]
    Walk(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn backend(
        operation: &'static str,
        path: impl Into<String>,
        source: object_store::Error,
    ) -> Self {
        Self::Backend {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<StorageError> for ExtractError {
    fn from(err: StorageError) -> Self {
        ExtractError::Storage(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

//! Storage abstractions for extraction artifacts.
//!
//! Provides:
//! - Object storage (S3-compatible or local filesystem) for published artifacts
//! - The [`BlobStore`] collaborator used by the publisher to upload a
//!   working directory tree

pub mod blob;
pub mod error;
pub mod object_store;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig};
pub use blob::{BlobStore, ObjectBlobStore, RemoteUri, UploadSummary};
pub use error::{StorageError, StorageResult};

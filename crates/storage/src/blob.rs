//! Blob store collaborator: upload a local tree to a remote URI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{StorageError, StorageResult};
use crate::object_store::{ObjectStorage, ObjectStorageConfig};

/// A parsed destination URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUri {
    /// `s3://bucket/prefix`
    S3 { bucket: String, prefix: String },
    /// `file:///absolute/dir`
    Local { root: PathBuf },
}

impl RemoteUri {
    pub fn parse(uri: &str) -> StorageResult<Self> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(StorageError::invalid_uri(uri, "missing bucket name"));
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.trim_matches('/').to_string(),
            });
        }

        if let Some(path) = uri.strip_prefix("file://") {
            if path.is_empty() {
                return Err(StorageError::invalid_uri(uri, "missing directory"));
            }
            return Ok(Self::Local {
                root: PathBuf::from(path),
            });
        }

        if uri.contains("://") {
            return Err(StorageError::invalid_uri(
                uri,
                "expected an s3:// or file:// URI",
            ));
        }

        // A bare `bucket/prefix` names an S3 destination.
        if uri.starts_with('/') || uri.starts_with('.') {
            return Err(StorageError::invalid_uri(
                uri,
                "local destinations need a file:// scheme",
            ));
        }
        Self::parse(&format!("s3://{}", uri))
    }

    /// Key prefix inside the store.
    pub fn prefix(&self) -> &str {
        match self {
            Self::S3 { prefix, .. } => prefix,
            Self::Local { .. } => "",
        }
    }
}

/// Files at or above this size are streamed with a multipart upload.
pub const MULTIPART_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Result of an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub objects: u64,
    pub bytes: u64,
}

/// Uploads local artifacts to durable storage.
///
/// Local files are left in place whatever the outcome, so a failed upload
/// can be retried without recomputing them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `local_path` to `remote_uri`.
    ///
    /// A directory is uploaded with keys relative to it; with `recursive`
    /// unset only its immediate files are sent. A single file is uploaded
    /// under its file name.
    async fn put(
        &self,
        local_path: &Path,
        remote_uri: &str,
        recursive: bool,
    ) -> StorageResult<UploadSummary>;
}

/// [`BlobStore`] backed by `object_store`.
#[derive(Debug, Clone, Default)]
pub struct ObjectBlobStore {
    config: ObjectStorageConfig,
}

impl ObjectBlobStore {
    pub fn new(config: ObjectStorageConfig) -> Self {
        Self { config }
    }

    fn connect(&self, uri: &RemoteUri) -> StorageResult<ObjectStorage> {
        match uri {
            RemoteUri::S3 { bucket, .. } => ObjectStorage::s3(&self.config, bucket),
            RemoteUri::Local { root } => ObjectStorage::local(root),
        }
    }
}

/// Files to upload with their keys relative to `local_path`.
fn collect_files(local_path: &Path, recursive: bool) -> StorageResult<Vec<(PathBuf, String)>> {
    if local_path.is_file() {
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::Walk(local_path.display().to_string()))?;
        return Ok(vec![(local_path.to_path_buf(), name)]);
    }

    let mut walker = walkdir::WalkDir::new(local_path).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| StorageError::Walk(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(local_path)
            .map_err(|e| StorageError::Walk(e.to_string()))?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((entry.path().to_path_buf(), key));
    }

    Ok(files)
}

fn join_key(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    #[instrument(skip(self, local_path), fields(local = %local_path.display()))]
    async fn put(
        &self,
        local_path: &Path,
        remote_uri: &str,
        recursive: bool,
    ) -> StorageResult<UploadSummary> {
        let uri = RemoteUri::parse(remote_uri)?;
        let storage = self.connect(&uri)?;
        let files = collect_files(local_path, recursive)?;

        let mut summary = UploadSummary::default();
        for (path, relative) in files {
            let key = join_key(uri.prefix(), &relative);
            let size = if tokio::fs::metadata(&path).await?.len() >= MULTIPART_THRESHOLD {
                storage.put_file_multipart(&key, &path).await?
            } else {
                let data = tokio::fs::read(&path).await?;
                let size = data.len() as u64;
                storage.put(&key, Bytes::from(data)).await?;
                size
            };
            summary.objects += 1;
            summary.bytes += size;

            debug!(key = %key, size, "Uploaded file");
        }

        info!(
            destination = %remote_uri,
            objects = summary.objects,
            bytes = summary.bytes,
            "Upload complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::ScratchDir;

    #[test]
    fn test_parse_uris() {
        assert_eq!(
            RemoteUri::parse("s3://bucket/runs/2024/").unwrap(),
            RemoteUri::S3 {
                bucket: "bucket".into(),
                prefix: "runs/2024".into()
            }
        );
        assert_eq!(RemoteUri::parse("s3://bucket").unwrap().prefix(), "");
        assert_eq!(
            RemoteUri::parse("file:///tmp/out").unwrap(),
            RemoteUri::Local {
                root: PathBuf::from("/tmp/out")
            }
        );
        assert!(matches!(
            RemoteUri::parse("gs://bucket"),
            Err(StorageError::InvalidUri { .. })
        ));
        assert!(RemoteUri::parse("s3:///prefix").is_err());
    }

    #[test]
    fn test_bare_destination_is_s3() {
        assert_eq!(
            RemoteUri::parse("bucket/runs/2024").unwrap(),
            RemoteUri::S3 {
                bucket: "bucket".into(),
                prefix: "runs/2024".into()
            }
        );
        assert_eq!(
            RemoteUri::parse("bucket").unwrap(),
            RemoteUri::S3 {
                bucket: "bucket".into(),
                prefix: String::new()
            }
        );
        assert!(RemoteUri::parse("/tmp/out").is_err());
        assert!(RemoteUri::parse("").is_err());
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "a/b.tif"), "a/b.tif");
        assert_eq!(join_key("runs", "a/b.tif"), "runs/a/b.tif");
    }

    fn populate(work: &Path) {
        std::fs::write(work.join("raster_0_0.tif"), b"tile").unwrap();
        std::fs::write(work.join("manifest.json"), b"{}").unwrap();
        std::fs::create_dir_all(work.join("mosaic.zarr/0")).unwrap();
        std::fs::write(work.join("mosaic.zarr/zarr.json"), b"{\"a\":1}").unwrap();
        std::fs::write(work.join("mosaic.zarr/0/zarr.json"), b"{}").unwrap();
    }

    #[tokio::test]
    async fn test_recursive_upload_keeps_local_files() {
        let scratch = ScratchDir::new();
        let work = scratch.work_dir();
        populate(&work);

        let store = ObjectBlobStore::default();
        let summary = store.put(&work, &scratch.remote_uri(), true).await.unwrap();
        assert_eq!(summary.objects, 4);
        assert_eq!(summary.bytes, 4 + 2 + 7 + 2);

        let remote = scratch.root().join("remote");
        assert!(remote.join("mosaic.zarr/0/zarr.json").is_file());
        assert_eq!(std::fs::read(remote.join("raster_0_0.tif")).unwrap(), b"tile");

        // Sources stay on disk.
        assert!(work.join("raster_0_0.tif").is_file());
        assert!(work.join("mosaic.zarr/zarr.json").is_file());
    }

    #[tokio::test]
    async fn test_non_recursive_upload_skips_subdirectories() {
        let scratch = ScratchDir::new();
        let work = scratch.work_dir();
        populate(&work);

        let store = ObjectBlobStore::default();
        let summary = store.put(&work, &scratch.remote_uri(), false).await.unwrap();
        assert_eq!(summary.objects, 2);

        let remote = scratch.root().join("remote");
        assert_eq!(
            test_utils::list_file_names(&remote),
            vec!["manifest.json", "raster_0_0.tif"]
        );
        assert!(!remote.join("mosaic.zarr").exists());
    }

    #[tokio::test]
    async fn test_single_file_upload() {
        let scratch = ScratchDir::new();
        let file = scratch.work_dir().join("mosaic.tif");
        std::fs::write(&file, b"abc").unwrap();

        let summary = ObjectBlobStore::default()
            .put(&file, &scratch.remote_uri(), false)
            .await
            .unwrap();
        assert_eq!(summary, UploadSummary { objects: 1, bytes: 3 });
        assert!(scratch.root().join("remote/mosaic.tif").is_file());
    }

    #[tokio::test]
    async fn test_large_file_uses_multipart_upload() {
        let scratch = ScratchDir::new();
        let file = scratch.work_dir().join("mosaic.tif");
        let size = MULTIPART_THRESHOLD as usize + 4096;
        let payload: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
        std::fs::write(&file, &payload).unwrap();

        let summary = ObjectBlobStore::default()
            .put(&file, &scratch.remote_uri(), false)
            .await
            .unwrap();
        assert_eq!(summary.bytes, size as u64);
        assert_eq!(
            std::fs::read(scratch.root().join("remote/mosaic.tif")).unwrap(),
            payload
        );
    }

    #[tokio::test]
    async fn test_invalid_uri_is_storage_error() {
        let scratch = ScratchDir::new();
        let err = ObjectBlobStore::default()
            .put(&scratch.work_dir(), "ftp://host/dir", true)
            .await
            .unwrap_err();
        let extract: tile_common::ExtractError = err.into();
        assert!(matches!(extract, tile_common::ExtractError::Storage(_)));
    }
}

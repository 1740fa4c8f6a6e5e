//! Object storage interface for published artifacts (S3 compatible or local).

use std::path::Path as LocalPath;
use std::sync::Arc;

use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, local::LocalFileSystem, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::error::{StorageError, StorageResult};

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3 endpoint URL
    pub endpoint: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    #[serde(skip_serializing)]
    pub secret_access_key: String,
    /// Region
    pub region: String,
    /// Allow plain HTTP endpoints
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://us-iad-1.linodeobjects.com".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-east-1".to_string(),
            allow_http: false,
        }
    }
}

impl ObjectStorageConfig {
    /// Load settings from `S3_*` variables, falling back to `AWS_*` keys.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let first_of = |names: &[&str]| names.iter().find_map(|n| std::env::var(n).ok());

        Self {
            endpoint: first_of(&["S3_ENDPOINT"]).unwrap_or(defaults.endpoint),
            access_key_id: first_of(&["S3_ACCESS_KEY", "AWS_ACCESS_KEY", "AWS_ACCESS_KEY_ID"])
                .unwrap_or_default(),
            secret_access_key: first_of(&[
                "S3_SECRET_KEY",
                "AWS_SECRET_KEY",
                "AWS_SECRET_ACCESS_KEY",
            ])
            .unwrap_or_default(),
            region: first_of(&["S3_REGION", "AWS_REGION"]).unwrap_or(defaults.region),
            allow_http: first_of(&["S3_ALLOW_HTTP"])
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.allow_http),
        }
    }
}

/// Object storage client.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    /// Bucket name or local root, for logging.
    location: String,
}

impl ObjectStorage {
    /// Client for `bucket` on an S3-compatible endpoint.
    pub fn s3(config: &ObjectStorageConfig, bucket: &str) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Client(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            location: format!("s3://{}", bucket),
        })
    }

    /// Client rooted at a local directory, created if missing.
    pub fn local(root: &LocalPath) -> StorageResult<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| StorageError::Client(format!("Failed to open {}: {}", root.display(), e)))?;

        Ok(Self {
            store: Arc::new(store),
            location: format!("file://{}", root.display()),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Write bytes to a key.
    #[instrument(skip(self, data), fields(location = %self.location, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let key = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&key, data.into())
            .await
            .map_err(|e| StorageError::backend("put", path, e))?;

        Ok(())
    }

    /// Stream a local file to a key through a multipart upload.
    ///
    /// The upload is aborted on failure so no partial object is left behind.
    #[instrument(skip(self, source), fields(location = %self.location, path = %path))]
    pub async fn put_file_multipart(&self, path: &str, source: &LocalPath) -> StorageResult<u64> {
        let key = Path::from(path);
        let mut file = tokio::fs::File::open(source).await?;

        let (id, mut writer) = self
            .store
            .put_multipart(&key)
            .await
            .map_err(|e| StorageError::backend("put_multipart", path, e))?;

        let copied = async {
            let size = tokio::io::copy(&mut file, &mut writer).await?;
            writer.shutdown().await?;
            Ok::<u64, std::io::Error>(size)
        }
        .await;

        match copied {
            Ok(size) => {
                debug!(size, "Wrote object in parts");
                Ok(size)
            }
            Err(err) => {
                if let Err(abort) = self.store.abort_multipart(&key, &id).await {
                    warn!(error = %abort, "Failed to abort multipart upload");
                }
                Err(err.into())
            }
        }
    }
}

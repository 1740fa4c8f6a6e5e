//! Publication of the working directory.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use storage::{BlobStore, UploadSummary};
use tile_common::ExtractResult;

/// Hands the finished artifact set to a [`BlobStore`].
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn BlobStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Upload `work_dir` recursively to `destination`.
    ///
    /// Local files are kept whatever the outcome.
    #[instrument(skip(self, work_dir), fields(work_dir = %work_dir.display()))]
    pub async fn publish(&self, work_dir: &Path, destination: &str) -> ExtractResult<UploadSummary> {
        let summary = self.store.put(work_dir, destination, true).await?;
        info!(
            objects = summary.objects,
            bytes = summary.bytes,
            "Publish complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use storage::{StorageError, StorageResult};
    use tile_common::ExtractError;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<(String, bool)>>,
        fail: bool,
    }

    #[async_trait]
    impl BlobStore for RecordingStore {
        async fn put(
            &self,
            _local_path: &Path,
            remote_uri: &str,
            recursive: bool,
        ) -> StorageResult<UploadSummary> {
            self.calls
                .lock()
                .unwrap()
                .push((remote_uri.to_string(), recursive));
            if self.fail {
                return Err(StorageError::Client("access denied".to_string()));
            }
            Ok(UploadSummary {
                objects: 3,
                bytes: 42,
            })
        }
    }

    #[tokio::test]
    async fn test_publish_is_recursive() {
        let store = Arc::new(RecordingStore::default());
        let publisher = Publisher::new(store.clone());

        let summary = publisher
            .publish(Path::new("/tmp/work"), "s3://bucket/run")
            .await
            .unwrap();

        assert_eq!(summary.objects, 3);
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec![("s3://bucket/run".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_storage_error() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let err = Publisher::new(store)
            .publish(Path::new("/tmp/work"), "s3://bucket/run")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Storage(_)));
    }
}

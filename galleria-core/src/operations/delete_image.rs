use super::{Timeouts, bounded, require_key};
use crate::Result;
use crate::storage::{BlobStore, MetadataStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct DeleteImageOperation {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    timeouts: Timeouts,
}

#[derive(Debug, Clone)]
pub struct DeleteImageOperationRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteImageOperationOutcome {
    Deleted {
        key: String,
        path: String,
        removed_records: usize,
        /// The object is gone but its record could not be removed; listings hide it.
        metadata_orphaned: bool,
    },
    NotFound,
}

impl DeleteImageOperation {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            blobs,
            metadata,
            timeouts,
        }
    }

    pub async fn run(&self, request: DeleteImageOperationRequest) -> Result<DeleteImageOperationOutcome> {
        let key = require_key(&request.key)?.to_string();
        let path = self.blobs.get_locator(&key);
        let store_timeout = self.timeouts.store;

        let object_existed =
            bounded(store_timeout, "object exists", self.blobs.exists(&key)).await?;
        bounded(store_timeout, "object delete", self.blobs.delete(&key)).await?;

        match bounded(
            store_timeout,
            "metadata delete",
            self.metadata.delete_by_path(&path),
        )
        .await
        {
            Ok(0) if !object_existed => {
                tracing::debug!("delete {}: nothing stored", key);
                Ok(DeleteImageOperationOutcome::NotFound)
            }
            Ok(removed_records) => {
                tracing::info!(
                    "Deleted {} (object existed: {}, records removed: {})",
                    key,
                    object_existed,
                    removed_records
                );
                Ok(DeleteImageOperationOutcome::Deleted {
                    key,
                    path,
                    removed_records,
                    metadata_orphaned: false,
                })
            }
            Err(error) if object_existed => {
                tracing::warn!(
                    "Deleted object {} but its record remains and is now orphaned: {}",
                    key,
                    error
                );
                Ok(DeleteImageOperationOutcome::Deleted {
                    key,
                    path,
                    removed_records: 0,
                    metadata_orphaned: true,
                })
            }
            Err(error) => Err(error),
        }
    }
}

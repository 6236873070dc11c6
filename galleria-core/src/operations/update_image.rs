use super::{Timeouts, analyze_or_degrade, bounded, require_key};
use crate::model::AssetRecord;
use crate::storage::{BlobStore, MetadataStore};
use crate::tagging::TaggingOracle;
use crate::{GalleriaError, Result};
use bytes::Bytes;
use std::sync::Arc;

/// Replace an asset's bytes and re-tag it in place.
///
/// The previous bytes are kept in memory until the record is updated so a
/// failed metadata write can put them back.
#[derive(Clone)]
pub struct UpdateImageOperation {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    tagger: Arc<dyn TaggingOracle>,
    timeouts: Timeouts,
}

#[derive(Debug, Clone)]
pub struct UpdateImageOperationRequest {
    pub key: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct UpdateImageOperationResult {
    pub record: AssetRecord,
}

impl UpdateImageOperation {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        tagger: Arc<dyn TaggingOracle>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            blobs,
            metadata,
            tagger,
            timeouts,
        }
    }

    pub async fn run(&self, request: UpdateImageOperationRequest) -> Result<UpdateImageOperationResult> {
        let key = require_key(&request.key)?;
        if request.bytes.is_empty() {
            return Err(GalleriaError::InvalidArgument(format!(
                "replacement for {} is empty",
                key
            )));
        }

        let store_timeout = self.timeouts.store;
        let path = self.blobs.get_locator(key);

        if !bounded(store_timeout, "object exists", self.blobs.exists(key)).await? {
            return Err(GalleriaError::NotFound(format!("object {}", key)));
        }
        if bounded(store_timeout, "metadata lookup", self.metadata.find_by_path(&path))
            .await?
            .is_none()
        {
            return Err(GalleriaError::NotFound(format!("record for {}", path)));
        }

        let previous = bounded(store_timeout, "object get", self.blobs.get(key)).await?;
        bounded(
            store_timeout,
            "object put",
            self.blobs.put(key, request.bytes.clone()),
        )
        .await?;
        tracing::debug!("update {}: new bytes written", key);

        let analysis =
            analyze_or_degrade(self.tagger.as_ref(), request.bytes, self.timeouts.tagging, key)
                .await;

        let cause = match bounded(
            store_timeout,
            "metadata analysis update",
            self.metadata.update_analysis(&path, &analysis),
        )
        .await
        {
            Ok(0) => GalleriaError::NotFound(format!("record for {} vanished during update", path)),
            Ok(_) => {
                let record = bounded(
                    store_timeout,
                    "metadata lookup",
                    self.metadata.find_by_path(&path),
                )
                .await?
                .ok_or_else(|| GalleriaError::NotFound(format!("record for {}", path)))?;
                tracing::info!("Updated {} (id {}), {} tags", key, record.id, record.tags.len());
                return Ok(UpdateImageOperationResult { record });
            }
            Err(error) => error,
        };

        Err(self.restore(key, &path, previous, cause).await)
    }

    async fn restore(&self, key: &str, path: &str, previous: Bytes, cause: GalleriaError) -> GalleriaError {
        match bounded(
            self.timeouts.store,
            "compensating put",
            self.blobs.put(key, previous),
        )
        .await
        {
            Ok(_) => {
                tracing::warn!("Update of {} rolled back: {}", key, cause);
                cause
            }
            Err(restore_error) => {
                tracing::error!(
                    "Update of {} failed ({}) and the previous bytes could not be restored ({})",
                    key,
                    cause,
                    restore_error
                );
                GalleriaError::inconsistent(
                    format!(
                        "{} holds new bytes but its record was not updated ({}); restore failed ({})",
                        key, cause, restore_error
                    ),
                    vec![path.to_string()],
                )
            }
        }
    }
}

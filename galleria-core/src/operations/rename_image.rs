use super::{Timeouts, bounded, require_key};
use crate::keys::renamed_key;
use crate::storage::{BlobStore, MetadataStore};
use crate::{GalleriaError, Result};
use std::sync::Arc;

/// Move an asset to a new key.
///
/// The object store has no rename, so this is copy, confirm, delete old,
/// then repoint the record. The old object is only removed once the copy is
/// visible, and the record only moves once the old object is gone.
#[derive(Clone)]
pub struct RenameImageOperation {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    timeouts: Timeouts,
}

#[derive(Debug, Clone)]
pub struct RenameImageOperationRequest {
    pub old_key: String,
    /// New base name; the old key's extension is kept.
    pub new_name: String,
}

#[derive(Debug, Clone)]
pub struct RenameImageOperationResult {
    pub new_key: String,
    pub new_path: String,
    pub matched: usize,
}

impl RenameImageOperation {
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

    pub async fn run(
        &self,
        request: RenameImageOperationRequest,
    ) -> Result<RenameImageOperationResult> {
        let old_key = require_key(&request.old_key)?;
        let new_key = renamed_key(old_key, &request.new_name)?;
        if new_key == old_key {
            return Err(GalleriaError::InvalidArgument(format!(
                "{} is already named {}",
                old_key, new_key
            )));
        }

        let store_timeout = self.timeouts.store;
        let old_path = self.blobs.get_locator(old_key);
        let new_path = self.blobs.get_locator(&new_key);

        if bounded(store_timeout, "object exists", self.blobs.exists(&new_key)).await? {
            return Err(GalleriaError::Conflict(format!("{} already exists", new_key)));
        }

        bounded(
            store_timeout,
            "object copy",
            self.blobs.copy(old_key, &new_key),
        )
        .await?;
        tracing::debug!("rename {}: copied to {}", old_key, new_key);

        let visible = bounded(store_timeout, "object exists", self.blobs.exists(&new_key)).await;
        if !matches!(visible, Ok(true)) {
            let cause = match visible {
                Err(error) => error,
                _ => GalleriaError::Unavailable(format!("copy to {} is not visible", new_key)),
            };
            return Err(self.discard_copy(old_key, &new_key, &new_path, cause).await);
        }

        if let Err(error) = bounded(store_timeout, "object delete", self.blobs.delete(old_key)).await
        {
            tracing::error!(
                "Rename {} -> {} left both objects in place: {}",
                old_key,
                new_key,
                error
            );
            return Err(GalleriaError::inconsistent(
                format!(
                    "{} was copied to {} but the original could not be removed ({}); record still points at {}",
                    old_key, new_key, error, old_path
                ),
                vec![old_path, new_path],
            ));
        }
        tracing::debug!("rename {}: original removed", old_key);

        let matched = match bounded(
            store_timeout,
            "metadata path update",
            self.metadata.update_path(&old_path, &new_path),
        )
        .await
        {
            Ok(matched) => matched,
            Err(error) => {
                tracing::error!(
                    "Rename {} -> {} moved the object but not its record: {}",
                    old_key,
                    new_key,
                    error
                );
                return Err(GalleriaError::inconsistent(
                    format!(
                        "{} moved to {} but the record update failed ({})",
                        old_key, new_key, error
                    ),
                    vec![new_path],
                ));
            }
        };

        if matched == 0 {
            tracing::warn!(
                "Rename {} -> {} moved an object that had no record",
                old_key,
                new_key
            );
            return Err(GalleriaError::NotFound(format!(
                "{} moved to {} but no record matched {}",
                old_key, new_key, old_path
            )));
        }

        tracing::info!("Renamed {} -> {}", old_key, new_key);
        Ok(RenameImageOperationResult {
            new_key,
            new_path,
            matched,
        })
    }

    /// The original is untouched at this point, so removing the partial copy restores the start state.
    async fn discard_copy(
        &self,
        old_key: &str,
        new_key: &str,
        new_path: &str,
        cause: GalleriaError,
    ) -> GalleriaError {
        match bounded(
            self.timeouts.store,
            "compensating delete",
            self.blobs.delete(new_key),
        )
        .await
        {
            Ok(()) => {
                tracing::warn!("Rename {} -> {} aborted: {}", old_key, new_key, cause);
                cause
            }
            Err(delete_error) => GalleriaError::inconsistent(
                format!(
                    "copy of {} to {} was not confirmed ({}) and could not be removed ({})",
                    old_key, new_key, cause, delete_error
                ),
                vec![new_path.to_string()],
            ),
        }
    }
}

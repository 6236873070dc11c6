use super::{Timeouts, analyze_or_degrade, bounded};
use crate::id_allocator::IdAllocator;
use crate::keys::sanitize_key;
use crate::model::AssetRecord;
use crate::storage::{BlobStore, MetadataStore};
use crate::tagging::TaggingOracle;
use crate::{GalleriaError, Result};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct UploadImagesOperation {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    tagger: Arc<dyn TaggingOracle>,
    ids: IdAllocator,
    timeouts: Timeouts,
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadImagesOperationRequest {
    pub files: Vec<UploadFile>,
}

#[derive(Debug, Clone)]
pub struct UploadImagesOperationResult {
    pub records: Vec<AssetRecord>,
}

impl UploadImagesOperation {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        tagger: Arc<dyn TaggingOracle>,
        ids: IdAllocator,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            blobs,
            metadata,
            tagger,
            ids,
            timeouts,
        }
    }

    pub async fn run(
        &self,
        request: UploadImagesOperationRequest,
    ) -> Result<UploadImagesOperationResult> {
        let UploadImagesOperationRequest { files } = request;
        if files.is_empty() {
            return Err(GalleriaError::InvalidArgument(
                "no image provided".to_string(),
            ));
        }

        let mut staged = Vec::with_capacity(files.len());
        let mut seen = HashSet::new();
        for file in files {
            let key = sanitize_key(&file.filename)?;
            if file.bytes.is_empty() {
                return Err(GalleriaError::InvalidArgument(format!(
                    "image {} is empty",
                    key
                )));
            }
            if !seen.insert(key.clone()) {
                return Err(GalleriaError::Conflict(format!(
                    "{} appears more than once in the upload",
                    key
                )));
            }
            staged.push((key, file.bytes));
        }

        // Reject the whole batch before writing anything. Best effort only:
        // the conditional put below is what actually guards each key.
        for (key, _) in &staged {
            if bounded(self.timeouts.store, "object exists", self.blobs.exists(key)).await? {
                return Err(GalleriaError::Conflict(format!("{} already exists", key)));
            }
        }

        let mut records = Vec::with_capacity(staged.len());
        for (key, bytes) in staged {
            match self.upload_one(&key, bytes).await {
                Ok(record) => records.push(record),
                Err(error) => {
                    if !records.is_empty() {
                        tracing::warn!(
                            "Upload batch stopped at {} after {} committed images",
                            key,
                            records.len()
                        );
                    }
                    return Err(error);
                }
            }
        }

        Ok(UploadImagesOperationResult { records })
    }

    async fn upload_one(&self, key: &str, bytes: Bytes) -> Result<AssetRecord> {
        let locator = bounded(
            self.timeouts.store,
            "object put",
            self.blobs.put_if_absent(key, bytes.clone()),
        )
        .await?;
        tracing::debug!("upload {}: object written at {}", key, locator);

        let analysis =
            analyze_or_degrade(self.tagger.as_ref(), bytes, self.timeouts.tagging, key).await;

        match self.commit_record(&locator, analysis).await {
            Ok(record) => {
                tracing::info!(
                    "Catalogued {} as id {} with {} tags",
                    key,
                    record.id,
                    record.tags.len()
                );
                Ok(record)
            }
            Err(error) => Err(self.compensate(key, &locator, error).await),
        }
    }

    async fn commit_record(
        &self,
        locator: &str,
        analysis: crate::model::ImageAnalysis,
    ) -> Result<AssetRecord> {
        let id = self.ids.allocate_next_id().await?;
        let record = AssetRecord::new(id, locator, analysis);
        bounded(
            self.timeouts.store,
            "metadata insert",
            self.metadata.insert(&record),
        )
        .await?;
        Ok(record)
    }

    /// Remove the object written by a failed upload and report what is left behind.
    async fn compensate(&self, key: &str, locator: &str, cause: GalleriaError) -> GalleriaError {
        match bounded(
            self.timeouts.store,
            "compensating delete",
            self.blobs.delete(key),
        )
        .await
        {
            Ok(()) => {
                tracing::warn!("Upload of {} rolled back: {}", key, cause);
                cause
            }
            Err(delete_error) => {
                tracing::error!(
                    "Upload of {} failed ({}) and its object could not be removed ({})",
                    key,
                    cause,
                    delete_error
                );
                GalleriaError::inconsistent(
                    format!(
                        "upload of {} failed ({}) and compensating delete failed ({})",
                        key, cause, delete_error
                    ),
                    vec![locator.to_string()],
                )
            }
        }
    }
}

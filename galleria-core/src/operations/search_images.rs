use super::{Timeouts, bounded};
use crate::model::AssetRecord;
use crate::storage::{BlobStore, MetadataStore};
use crate::{GalleriaError, Result};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct SearchImagesOperation {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    timeouts: Timeouts,
}

#[derive(Debug, Clone)]
pub struct SearchImagesOperationRequest {
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct SearchImagesOperationResult {
    pub images: Vec<AssetRecord>,
}

impl SearchImagesOperation {
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

    /// Case-insensitive substring match against tags; records whose object is gone are dropped.
    pub async fn run(&self, request: SearchImagesOperationRequest) -> Result<SearchImagesOperationResult> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(GalleriaError::InvalidArgument(
                "no query provided".to_string(),
            ));
        }

        let hits = bounded(
            self.timeouts.store,
            "metadata tag query",
            self.metadata.query_tags_containing(query, true),
        )
        .await?;
        if hits.is_empty() {
            return Ok(SearchImagesOperationResult { images: hits });
        }

        let entries = bounded(self.timeouts.store, "object list", self.blobs.list()).await?;
        let live: HashSet<String> = entries.into_iter().map(|e| e.locator).collect();
        let total = hits.len();
        let images: Vec<AssetRecord> = hits
            .into_iter()
            .filter(|record| live.contains(&record.path))
            .collect();

        if images.len() < total {
            tracing::debug!(
                "search {:?}: dropped {} records without objects",
                query,
                total - images.len()
            );
        }

        Ok(SearchImagesOperationResult { images })
    }
}

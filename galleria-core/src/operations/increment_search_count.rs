use super::{Timeouts, bounded};
use crate::model::{AssetRecord, CounterField};
use crate::storage::MetadataStore;
use crate::{GalleriaError, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct IncrementSearchCountOperation {
    metadata: Arc<dyn MetadataStore>,
    timeouts: Timeouts,
}

#[derive(Debug, Clone, Copy)]
pub struct IncrementSearchCountOperationRequest {
    pub id: i64,
}

#[derive(Debug, Clone)]
pub struct IncrementSearchCountOperationResult {
    pub record: AssetRecord,
}

impl IncrementSearchCountOperation {
    pub fn new(metadata: Arc<dyn MetadataStore>, timeouts: Timeouts) -> Self {
        Self { metadata, timeouts }
    }

    pub async fn run(
        &self,
        request: IncrementSearchCountOperationRequest,
    ) -> Result<IncrementSearchCountOperationResult> {
        let id = request.id;

        bounded(
            self.timeouts.store,
            "search count increment",
            self.metadata
                .increment_field(id, CounterField::SearchCount, 1),
        )
        .await?;

        let record = bounded(
            self.timeouts.store,
            "metadata lookup",
            self.metadata.find_by_id(id),
        )
        .await?
        .ok_or_else(|| GalleriaError::NotFound(format!("image id {}", id)))?;

        tracing::debug!("search_count for id {} is now {}", id, record.search_count);
        Ok(IncrementSearchCountOperationResult { record })
    }
}

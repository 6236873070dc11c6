use crate::Result;
use crate::id_allocator::{IMAGES_COUNTER, IdAllocator};
use crate::model::{AssetRecord, GallerySort};
use crate::operations::*;
use crate::storage::{BlobStore, MetadataStore};
use crate::tagging::TaggingOracle;
use bytes::Bytes;
use std::sync::Arc;

/// Collaborators handed to the engine at construction.
#[derive(Clone)]
pub struct CatalogDeps {
    pub blobs: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub tagger: Arc<dyn TaggingOracle>,
    pub timeouts: Timeouts,
}

/// Entry point for the routing layer; one method per catalog operation.
#[derive(Clone)]
pub struct CatalogEngine {
    list_gallery: ListGalleryOperation,
    search_images: SearchImagesOperation,
    upload_images: UploadImagesOperation,
    rename_image: RenameImageOperation,
    delete_image: DeleteImageOperation,
    increment_search_count: IncrementSearchCountOperation,
    update_image: UpdateImageOperation,
    blobs: Arc<dyn BlobStore>,
}

impl CatalogEngine {
    pub fn new(deps: CatalogDeps) -> Self {
        let CatalogDeps {
            blobs,
            metadata,
            tagger,
            timeouts,
        } = deps;
        let ids = IdAllocator::new(metadata.clone(), IMAGES_COUNTER, timeouts.store);

        Self {
            list_gallery: ListGalleryOperation::new(blobs.clone(), metadata.clone(), timeouts),
            search_images: SearchImagesOperation::new(blobs.clone(), metadata.clone(), timeouts),
            upload_images: UploadImagesOperation::new(
                blobs.clone(),
                metadata.clone(),
                tagger.clone(),
                ids,
                timeouts,
            ),
            rename_image: RenameImageOperation::new(blobs.clone(), metadata.clone(), timeouts),
            delete_image: DeleteImageOperation::new(blobs.clone(), metadata.clone(), timeouts),
            increment_search_count: IncrementSearchCountOperation::new(metadata.clone(), timeouts),
            update_image: UpdateImageOperation::new(blobs.clone(), metadata, tagger, timeouts),
            blobs,
        }
    }

    pub fn locator(&self, key: &str) -> String {
        self.blobs.get_locator(key)
    }

    pub async fn list_gallery(
        &self,
        sort: GallerySort,
        diagnostics: bool,
    ) -> Result<ListGalleryOperationResult> {
        self.list_gallery
            .run(ListGalleryOperationRequest { sort, diagnostics })
            .await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<AssetRecord>> {
        let result = self
            .search_images
            .run(SearchImagesOperationRequest {
                query: query.to_string(),
            })
            .await?;
        Ok(result.images)
    }

    pub async fn upload(&self, files: Vec<UploadFile>) -> Result<Vec<AssetRecord>> {
        let result = self
            .upload_images
            .run(UploadImagesOperationRequest { files })
            .await?;
        Ok(result.records)
    }

    pub async fn rename(&self, old_key: &str, new_name: &str) -> Result<RenameImageOperationResult> {
        self.rename_image
            .run(RenameImageOperationRequest {
                old_key: old_key.to_string(),
                new_name: new_name.to_string(),
            })
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<DeleteImageOperationOutcome> {
        self.delete_image
            .run(DeleteImageOperationRequest {
                key: key.to_string(),
            })
            .await
    }

    pub async fn increment_search_count(&self, id: i64) -> Result<AssetRecord> {
        let result = self
            .increment_search_count
            .run(IncrementSearchCountOperationRequest { id })
            .await?;
        Ok(result.record)
    }

    pub async fn update(&self, key: &str, bytes: Bytes) -> Result<AssetRecord> {
        let result = self
            .update_image
            .run(UpdateImageOperationRequest {
                key: key.to_string(),
                bytes,
            })
            .await?;
        Ok(result.record)
    }
}

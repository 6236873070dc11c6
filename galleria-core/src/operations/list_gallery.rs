use super::{Timeouts, bounded};
use crate::Result;
use crate::model::{AssetRecord, GallerySort};
use crate::storage::{BlobStore, MetadataStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Reconciled gallery: only records whose object is currently listed.
///
/// This is the read-time guard against partially applied writes. Objects
/// without a record and records without an object are never listed; in
/// diagnostic mode they are reported instead.
#[derive(Clone)]
pub struct ListGalleryOperation {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    timeouts: Timeouts,
}

#[derive(Debug, Clone, Default)]
pub struct ListGalleryOperationRequest {
    pub sort: GallerySort,
    pub diagnostics: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    /// Keys of objects that have no record.
    pub objects_without_metadata: Vec<String>,
    /// Records whose object is not in the store.
    pub metadata_without_objects: Vec<AssetRecord>,
}

impl OrphanReport {
    pub fn is_clean(&self) -> bool {
        self.objects_without_metadata.is_empty() && self.metadata_without_objects.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ListGalleryOperationResult {
    pub images: Vec<AssetRecord>,
    pub orphans: Option<OrphanReport>,
}

impl ListGalleryOperation {
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

    pub async fn run(&self, request: ListGalleryOperationRequest) -> Result<ListGalleryOperationResult> {
        let store_timeout = self.timeouts.store;

        let entries = bounded(store_timeout, "object list", self.blobs.list()).await?;
        let live_paths: Vec<String> = entries.iter().map(|e| e.locator.clone()).collect();

        let images = bounded(
            store_timeout,
            "metadata query",
            self.metadata.query_by_paths(&live_paths, request.sort),
        )
        .await?;

        if !request.diagnostics {
            return Ok(ListGalleryOperationResult {
                images,
                orphans: None,
            });
        }

        let catalogued: HashSet<&str> = images.iter().map(|r| r.path.as_str()).collect();
        let mut objects_without_metadata: Vec<String> = entries
            .iter()
            .filter(|entry| !catalogued.contains(entry.locator.as_str()))
            .map(|entry| entry.key.clone())
            .collect();
        objects_without_metadata.sort();

        let live: HashSet<&str> = live_paths.iter().map(String::as_str).collect();
        let metadata_without_objects: Vec<AssetRecord> =
            bounded(store_timeout, "metadata list", self.metadata.list_all())
                .await?
                .into_iter()
                .filter(|record| !live.contains(record.path.as_str()))
                .collect();

        let report = OrphanReport {
            objects_without_metadata,
            metadata_without_objects,
        };
        if !report.is_clean() {
            tracing::warn!(
                "Gallery reconciliation found {} objects without records and {} stale records",
                report.objects_without_metadata.len(),
                report.metadata_without_objects.len()
            );
        }

        Ok(ListGalleryOperationResult {
            images,
            orphans: Some(report),
        })
    }
}

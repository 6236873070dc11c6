//! Galleria Core - image catalog kept consistent across an object store and a metadata store
//!
//! Images live as objects; their tags, captions and counters live as records:
//! - conditional puts guard uploads against concurrent writers
//! - multi-step writes compensate on failure or report the exact partial state
//! - gallery listings intersect both stores so orphans never surface
//! - SQLite for metadata, `object_store` for bytes

pub mod catalog;
pub mod error;
pub mod id_allocator;
pub mod keys;
pub mod model;
pub mod operations;
pub mod storage;
pub mod tagging;

#[cfg(test)]
mod test_support;

pub use catalog::{CatalogDeps, CatalogEngine};
pub use error::{ErrorKind, GalleriaError, Result};
pub use id_allocator::{IMAGES_COUNTER, IdAllocator};
pub use keys::{renamed_key, sanitize_key};
pub use model::{AssetRecord, CounterField, GallerySort, ImageAnalysis, SortKey, SortOrder};
pub use operations::{DeleteImageOperationOutcome, OrphanReport, Timeouts, UploadFile};
pub use storage::{
    BlobEntry, BlobStore, BlobStoreBuilder, MetadataStore, ObjectStoreBlobStore,
    SqliteMetadataStore,
};
pub use tagging::{DisabledTaggingOracle, TaggingOracle, VisionTaggingOracle};

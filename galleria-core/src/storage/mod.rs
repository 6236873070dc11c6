//! Storage adapters for Galleria
//!
//! Provides the object store for image bytes and the metadata store for asset records.

pub mod blob_store;
pub mod factory;
pub mod metadata_store;

pub use blob_store::{BlobEntry, BlobStore, ObjectStoreBlobStore};
pub use factory::BlobStoreBuilder;
pub use metadata_store::{MetadataStore, SqliteMetadataStore};

use crate::{GalleriaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};
use std::sync::Arc;

/// A stored object as seen by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub key: String,
    pub locator: String,
}

/// Binary assets keyed by flat names.
///
/// Every method re-reads the backing store; nothing is cached between calls.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Write unconditionally, replacing any existing object.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<String>;

    /// Write only if nothing is stored under `key`; `Conflict` otherwise.
    async fn put_if_absent(&self, key: &str, bytes: Bytes) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    fn get_locator(&self, key: &str) -> String;

    /// `NotFound` if the source is absent.
    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()>;

    /// Idempotent: deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<BlobEntry>>;
}

/// `BlobStore` over any `object_store` backend (memory, local disk, S3, Azure).
pub struct ObjectStoreBlobStore {
    inner: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl ObjectStoreBlobStore {
    pub fn new(inner: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            inner,
            public_base_url,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(object_store::memory::InMemory::new()),
            "memory://galleria",
        )
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    fn object_path(key: &str) -> Result<ObjectPath> {
        if key.trim().is_empty() {
            return Err(GalleriaError::InvalidArgument(
                "storage key cannot be empty".to_string(),
            ));
        }
        Ok(ObjectPath::from(key))
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let path = Self::object_path(key)?;
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<String> {
        let path = Self::object_path(key)?;
        self.inner.put(&path, PutPayload::from(bytes)).await?;
        tracing::debug!("Stored object {}", key);
        Ok(self.get_locator(key))
    }

    async fn put_if_absent(&self, key: &str, bytes: Bytes) -> Result<String> {
        let path = Self::object_path(key)?;
        match self
            .inner
            .put_opts(&path, PutPayload::from(bytes), PutOptions::from(PutMode::Create))
            .await
        {
            Ok(_) => {
                tracing::debug!("Created object {}", key);
                Ok(self.get_locator(key))
            }
            Err(object_store::Error::AlreadyExists { .. }) => Err(GalleriaError::Conflict(
                format!("{} already exists", key),
            )),
            Err(error) => Err(error.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = Self::object_path(key)?;
        let result = self.inner.get(&path).await?;
        Ok(result.bytes().await?)
    }

    fn get_locator(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()> {
        let source = Self::object_path(source_key)?;
        let dest = Self::object_path(dest_key)?;
        self.inner.copy(&source, &dest).await?;
        tracing::debug!("Copied object {} -> {}", source_key, dest_key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = Self::object_path(key)?;
        match self.inner.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn list(&self) -> Result<Vec<BlobEntry>> {
        let metas: Vec<object_store::ObjectMeta> = self.inner.list(None).try_collect().await?;
        Ok(metas
            .into_iter()
            .map(|meta| {
                let key = meta.location.to_string();
                let locator = self.get_locator(&key);
                BlobEntry { key, locator }
            })
            .collect())
    }
}

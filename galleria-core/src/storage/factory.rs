use super::blob_store::{BlobStore, ObjectStoreBlobStore};
use crate::{GalleriaError, Result};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct BlobStoreBuilder {
    backend: Option<String>,
    root: Option<PathBuf>,
    bucket: Option<String>,
    region: Option<String>,
    account: Option<String>,
    access_key: Option<String>,
    container: Option<String>,
    public_base_url: Option<String>,
}

impl BlobStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(GalleriaError::Config(
                "object store backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    fn required(value: &Option<String>, what: &str, backend: &str) -> Result<String> {
        let value = value.as_deref().unwrap_or_default().trim();
        if value.is_empty() {
            return Err(GalleriaError::Config(format!(
                "{} is required for {} backend",
                what, backend
            )));
        }
        Ok(value.to_string())
    }

    fn base_url_or(&self, fallback: String) -> String {
        self.public_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .unwrap_or(fallback)
    }

    pub fn build(&self) -> Result<Arc<dyn BlobStore>> {
        let backend = self.resolve_backend()?;

        let (inner, base_url): (Arc<dyn ObjectStore>, String) = match backend.as_str() {
            "memory" => (
                Arc::new(InMemory::new()),
                self.base_url_or("memory://galleria".to_string()),
            ),
            "local" => {
                let root = self.root.clone().ok_or_else(|| {
                    GalleriaError::Config("root is required for local backend".to_string())
                })?;
                std::fs::create_dir_all(&root)?;
                let root = std::fs::canonicalize(&root)?;
                let store = LocalFileSystem::new_with_prefix(&root)
                    .map_err(|e| GalleriaError::Config(e.to_string()))?;
                let fallback = format!("file://{}", root.display());
                (Arc::new(store), self.base_url_or(fallback))
            }
            "s3" => {
                let bucket = Self::required(&self.bucket, "bucket", "s3")?;
                let region = Self::required(&self.region, "region", "s3")?;
                let store = AmazonS3Builder::from_env()
                    .with_bucket_name(&bucket)
                    .with_region(&region)
                    .build()
                    .map_err(|e| GalleriaError::Config(e.to_string()))?;
                let fallback = format!("https://{}.s3.{}.amazonaws.com", bucket, region);
                (Arc::new(store), self.base_url_or(fallback))
            }
            "azure" => {
                let account = Self::required(&self.account, "account", "azure")?;
                let container = Self::required(&self.container, "container", "azure")?;
                let mut builder = MicrosoftAzureBuilder::from_env()
                    .with_account(&account)
                    .with_container_name(&container);
                if let Some(key) = self.access_key.as_deref().filter(|k| !k.trim().is_empty()) {
                    builder = builder.with_access_key(key);
                }
                let store = builder
                    .build()
                    .map_err(|e| GalleriaError::Config(e.to_string()))?;
                let fallback = format!("https://{}.blob.core.windows.net/{}", account, container);
                (Arc::new(store), self.base_url_or(fallback))
            }
            other => {
                return Err(GalleriaError::Config(format!(
                    "unsupported object store backend: {}",
                    other
                )));
            }
        };

        tracing::info!("Object store backend {} at {}", backend, base_url);
        Ok(Arc::new(ObjectStoreBlobStore::new(inner, base_url)))
    }
}

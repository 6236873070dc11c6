//! In-process doubles for exercising failure paths of the catalog operations.

use crate::catalog::{CatalogDeps, CatalogEngine};
use crate::id_allocator::{IMAGES_COUNTER, IdAllocator};
use crate::model::{AssetRecord, CounterField, GallerySort, ImageAnalysis};
use crate::operations::*;
use crate::storage::{BlobEntry, BlobStore, MetadataStore, ObjectStoreBlobStore, SqliteMetadataStore};
use crate::tagging::TaggingOracle;
use crate::{GalleriaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const STALL: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
pub struct Switch(AtomicBool);

impl Switch {
    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn injected(what: &str) -> GalleriaError {
    GalleriaError::Unavailable(format!("injected {} failure", what))
}

pub struct FlakyBlobStore {
    inner: ObjectStoreBlobStore,
    pub fail_copy: Switch,
    pub fail_delete: Switch,
    pub fail_list: Switch,
    failing_puts: Mutex<HashSet<String>>,
    put_allowance: AtomicUsize,
    hidden: Mutex<HashSet<String>>,
}

impl FlakyBlobStore {
    pub fn new() -> Self {
        Self {
            inner: ObjectStoreBlobStore::in_memory(),
            fail_copy: Switch::default(),
            fail_delete: Switch::default(),
            fail_list: Switch::default(),
            failing_puts: Mutex::new(HashSet::new()),
            put_allowance: AtomicUsize::new(0),
            hidden: Mutex::new(HashSet::new()),
        }
    }

    /// Writes to `key` fail from now on.
    pub fn fail_put_for(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    /// Let the next `count` writes to failing keys through.
    pub fn allow_puts(&self, count: usize) {
        self.put_allowance.store(count, Ordering::SeqCst);
    }

    /// `exists` reports `false` for `key` even when it is stored.
    pub fn hide_key(&self, key: &str) {
        self.hidden.lock().unwrap().insert(key.to_string());
    }

    /// Keys actually held, ignoring hidden keys and injected failures.
    pub async fn inner_keys(&self) -> Vec<String> {
        self.inner
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect()
    }

    fn check_put(&self, key: &str) -> Result<()> {
        if !self.failing_puts.lock().unwrap().contains(key) {
            return Ok(());
        }
        let allowed = self
            .put_allowance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if allowed { Ok(()) } else { Err(injected("put")) }
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        if self.hidden.lock().unwrap().contains(key) {
            return Ok(false);
        }
        self.inner.exists(key).await
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<String> {
        self.check_put(key)?;
        self.inner.put(key, bytes).await
    }

    async fn put_if_absent(&self, key: &str, bytes: Bytes) -> Result<String> {
        self.check_put(key)?;
        self.inner.put_if_absent(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.get(key).await
    }

    fn get_locator(&self, key: &str) -> String {
        self.inner.get_locator(key)
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()> {
        if self.fail_copy.is_on() {
            return Err(injected("copy"));
        }
        self.inner.copy(source_key, dest_key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_delete.is_on() {
            return Err(injected("delete"));
        }
        self.inner.delete(key).await
    }

    async fn list(&self) -> Result<Vec<BlobEntry>> {
        if self.fail_list.is_on() {
            return Err(injected("list"));
        }
        self.inner.list().await
    }
}

pub struct FlakyMetadataStore {
    inner: SqliteMetadataStore,
    pub fail_insert: Switch,
    pub stall_insert: Switch,
    pub fail_update_path: Switch,
    pub fail_update_analysis: Switch,
    pub fail_delete: Switch,
    pub fail_counter: Switch,
    pub stall_counter: Switch,
}

impl FlakyMetadataStore {
    pub fn open(dir: &tempfile::TempDir) -> Self {
        Self {
            inner: SqliteMetadataStore::new(dir.path().join("galleria.db"), Duration::from_secs(5))
                .unwrap(),
            fail_insert: Switch::default(),
            stall_insert: Switch::default(),
            fail_update_path: Switch::default(),
            fail_update_analysis: Switch::default(),
            fail_delete: Switch::default(),
            fail_counter: Switch::default(),
            stall_counter: Switch::default(),
        }
    }
}

#[async_trait]
impl MetadataStore for FlakyMetadataStore {
    async fn insert(&self, record: &AssetRecord) -> Result<()> {
        if self.stall_insert.is_on() {
            tokio::time::sleep(STALL).await;
        }
        if self.fail_insert.is_on() {
            return Err(injected("insert"));
        }
        self.inner.insert(record).await
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<AssetRecord>> {
        self.inner.find_by_path(path).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<AssetRecord>> {
        self.inner.find_by_id(id).await
    }

    async fn update_path(&self, old_path: &str, new_path: &str) -> Result<usize> {
        if self.fail_update_path.is_on() {
            return Err(injected("update_path"));
        }
        self.inner.update_path(old_path, new_path).await
    }

    async fn update_analysis(&self, path: &str, analysis: &ImageAnalysis) -> Result<usize> {
        if self.fail_update_analysis.is_on() {
            return Err(injected("update_analysis"));
        }
        self.inner.update_analysis(path, analysis).await
    }

    async fn delete_by_path(&self, path: &str) -> Result<usize> {
        if self.fail_delete.is_on() {
            return Err(injected("delete_by_path"));
        }
        self.inner.delete_by_path(path).await
    }

    async fn increment_field(&self, id: i64, field: CounterField, delta: i64) -> Result<()> {
        self.inner.increment_field(id, field, delta).await
    }

    async fn query_by_paths(&self, paths: &[String], sort: GallerySort) -> Result<Vec<AssetRecord>> {
        self.inner.query_by_paths(paths, sort).await
    }

    async fn query_tags_containing(
        &self,
        substring: &str,
        case_insensitive: bool,
    ) -> Result<Vec<AssetRecord>> {
        self.inner
            .query_tags_containing(substring, case_insensitive)
            .await
    }

    async fn list_all(&self) -> Result<Vec<AssetRecord>> {
        self.inner.list_all().await
    }

    async fn atomic_increment_counter(&self, counter_name: &str) -> Result<i64> {
        if self.stall_counter.is_on() {
            tokio::time::sleep(STALL).await;
        }
        if self.fail_counter.is_on() {
            return Err(injected("counter"));
        }
        self.inner.atomic_increment_counter(counter_name).await
    }
}

pub struct StaticTagger {
    analysis: Mutex<ImageAnalysis>,
    pub fail: Switch,
    pub stall: Switch,
}

impl StaticTagger {
    pub fn new() -> Self {
        Self {
            analysis: Mutex::new(ImageAnalysis {
                tags: vec!["photo".to_string()],
                description: "a photo".to_string(),
            }),
            fail: Switch::default(),
            stall: Switch::default(),
        }
    }

    pub fn set_analysis(&self, tags: &[&str], description: &str) {
        *self.analysis.lock().unwrap() = ImageAnalysis {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            description: description.to_string(),
        };
    }
}

#[async_trait]
impl TaggingOracle for StaticTagger {
    async fn analyze(&self, _bytes: Bytes) -> Result<ImageAnalysis> {
        if self.stall.is_on() {
            tokio::time::sleep(STALL).await;
        }
        if self.fail.is_on() {
            return Err(injected("analyze"));
        }
        Ok(self.analysis.lock().unwrap().clone())
    }
}

/// Fresh stores per test, plus constructors for every operation over them.
pub struct Harness {
    pub blobs: Arc<FlakyBlobStore>,
    pub metadata: Arc<FlakyMetadataStore>,
    pub tagger: Arc<StaticTagger>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            blobs: Arc::new(FlakyBlobStore::new()),
            metadata: Arc::new(FlakyMetadataStore::open(&dir)),
            tagger: Arc::new(StaticTagger::new()),
            _dir: dir,
        }
    }

    fn timeouts() -> Timeouts {
        Timeouts {
            store: Duration::from_secs(5),
            tagging: Duration::from_secs(5),
        }
    }

    pub fn upload_op(&self) -> UploadImagesOperation {
        self.upload_op_with(Self::timeouts())
    }

    pub fn upload_op_with(&self, timeouts: Timeouts) -> UploadImagesOperation {
        let ids = IdAllocator::new(self.metadata.clone(), IMAGES_COUNTER, timeouts.store);
        UploadImagesOperation::new(
            self.blobs.clone(),
            self.metadata.clone(),
            self.tagger.clone(),
            ids,
            timeouts,
        )
    }

    pub fn rename_op(&self) -> RenameImageOperation {
        RenameImageOperation::new(self.blobs.clone(), self.metadata.clone(), Self::timeouts())
    }

    pub fn delete_op(&self) -> DeleteImageOperation {
        DeleteImageOperation::new(self.blobs.clone(), self.metadata.clone(), Self::timeouts())
    }

    pub fn list_op(&self) -> ListGalleryOperation {
        ListGalleryOperation::new(self.blobs.clone(), self.metadata.clone(), Self::timeouts())
    }

    pub fn search_op(&self) -> SearchImagesOperation {
        SearchImagesOperation::new(self.blobs.clone(), self.metadata.clone(), Self::timeouts())
    }

    pub fn increment_op(&self) -> IncrementSearchCountOperation {
        IncrementSearchCountOperation::new(self.metadata.clone(), Self::timeouts())
    }

    pub fn update_op(&self) -> UpdateImageOperation {
        UpdateImageOperation::new(
            self.blobs.clone(),
            self.metadata.clone(),
            self.tagger.clone(),
            Self::timeouts(),
        )
    }

    pub fn engine(&self) -> CatalogEngine {
        CatalogEngine::new(CatalogDeps {
            blobs: self.blobs.clone(),
            metadata: self.metadata.clone(),
            tagger: self.tagger.clone(),
            timeouts: Self::timeouts(),
        })
    }

    /// Upload one image through the real upload path, tagged with the current analysis.
    pub async fn seed(&self, key: &str, bytes: &[u8]) -> AssetRecord {
        let request = UploadImagesOperationRequest {
            files: vec![UploadFile::new(key, Bytes::copy_from_slice(bytes))],
        };
        let mut result = self.upload_op().run(request).await.unwrap();
        result.records.remove(0)
    }
}

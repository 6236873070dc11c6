pub mod delete_image;
pub mod increment_search_count;
pub mod list_gallery;
pub mod rename_image;
pub mod search_images;
pub mod update_image;
pub mod upload_images;

pub use delete_image::{
    DeleteImageOperation, DeleteImageOperationOutcome, DeleteImageOperationRequest,
};
pub use increment_search_count::{
    IncrementSearchCountOperation, IncrementSearchCountOperationRequest,
    IncrementSearchCountOperationResult,
};
pub use list_gallery::{
    ListGalleryOperation, ListGalleryOperationRequest, ListGalleryOperationResult, OrphanReport,
};
pub use rename_image::{
    RenameImageOperation, RenameImageOperationRequest, RenameImageOperationResult,
};
pub use search_images::{
    SearchImagesOperation, SearchImagesOperationRequest, SearchImagesOperationResult,
};
pub use update_image::{
    UpdateImageOperation, UpdateImageOperationRequest, UpdateImageOperationResult,
};
pub use upload_images::{
    UploadFile, UploadImagesOperation, UploadImagesOperationRequest, UploadImagesOperationResult,
};

use crate::model::ImageAnalysis;
use crate::tagging::TaggingOracle;
use crate::{GalleriaError, Result};
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

/// Upper bounds for calls to external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Object store and metadata store round-trips.
    pub store: Duration,
    pub tagging: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(10),
            tagging: Duration::from_secs(15),
        }
    }
}

/// Run `future` with a deadline; an elapsed deadline is `Unavailable`.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(GalleriaError::Unavailable(format!(
            "{} timed out after {:?}",
            what, limit
        ))),
    }
}

/// Tagging never fails an operation: errors and timeouts yield an empty analysis.
pub(crate) async fn analyze_or_degrade(
    tagger: &dyn TaggingOracle,
    bytes: Bytes,
    limit: Duration,
    key: &str,
) -> ImageAnalysis {
    match bounded(limit, "image analysis", tagger.analyze(bytes)).await {
        Ok(analysis) => analysis,
        Err(error) => {
            tracing::warn!(
                "Tagging unavailable for {}, cataloguing without tags: {}",
                key,
                error
            );
            ImageAnalysis::empty()
        }
    }
}

pub(crate) fn require_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(GalleriaError::InvalidArgument(
            "storage key cannot be empty".to_string(),
        ));
    }
    Ok(key)
}

//! Tagging oracle: turns image bytes into tags and a caption.

pub mod vision;

use crate::Result;
use crate::model::ImageAnalysis;
use async_trait::async_trait;
use bytes::Bytes;

pub use vision::VisionTaggingOracle;

#[async_trait]
pub trait TaggingOracle: Send + Sync {
    async fn analyze(&self, bytes: Bytes) -> Result<ImageAnalysis>;
}

/// Used when no vision endpoint is configured; every image gets an empty analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTaggingOracle;

#[async_trait]
impl TaggingOracle for DisabledTaggingOracle {
    async fn analyze(&self, _bytes: Bytes) -> Result<ImageAnalysis> {
        Ok(ImageAnalysis::empty())
    }
}

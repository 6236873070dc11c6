use crate::storage::MetadataStore;
use crate::{GalleriaError, Result};
use std::sync::Arc;
use std::time::Duration;

pub const IMAGES_COUNTER: &str = "images";

/// Hands out catalog ids from a durable counter in the metadata store.
///
/// The increment happens inside the store in one statement, so concurrent
/// callers never observe the same value.
#[derive(Clone)]
pub struct IdAllocator {
    metadata: Arc<dyn MetadataStore>,
    counter_name: String,
    timeout: Duration,
}

impl IdAllocator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        counter_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            metadata,
            counter_name: counter_name.into(),
            timeout,
        }
    }

    pub async fn allocate_next_id(&self) -> Result<i64> {
        let outcome = tokio::time::timeout(
            self.timeout,
            self.metadata.atomic_increment_counter(&self.counter_name),
        )
        .await;

        match outcome {
            Ok(Ok(id)) => {
                tracing::debug!("Allocated id {} from counter {}", id, self.counter_name);
                Ok(id)
            }
            Ok(Err(error)) => Err(GalleriaError::Unavailable(format!(
                "id allocation failed: {}",
                error
            ))),
            Err(_) => Err(GalleriaError::Unavailable(format!(
                "id allocation timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

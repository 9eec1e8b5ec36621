//! Persisted metadata per cache key

use crate::error::GantryResult;
use crate::resource::MetadataField;
use async_trait::async_trait;

/// Cache metadata store
///
/// Holds the metadata a get script emitted, keyed by cache key, so that
/// cache hits return the same result the Create produced.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Replace the metadata recorded for `key`
    async fn update_metadata(&self, key: &str, metadata: &[MetadataField]) -> GantryResult<()>;

    /// Metadata recorded for `key`, `None` if nothing was ever recorded
    async fn read_metadata(&self, key: &str) -> GantryResult<Option<Vec<MetadataField>>>;
}

//! Cross-run metadata persistence.

use crate::error::Result;
use crate::metadata::MetadataStore;

/// Durable storage for the metadata snapshot.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataPersistence: Send + Sync {
    /// Snapshot saved by the previous run, empty if there was none.
    fn load(&self) -> Result<MetadataStore>;

    fn save(&self, metadata: &MetadataStore) -> Result<()>;
}

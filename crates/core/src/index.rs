//! Queryable metadata mirror used by the managed backend.

use async_trait::async_trait;
use psp_shared::{SessionFilter, SessionMetadata, StorageResult};

/// Repository trait for the denormalized session metadata table.
///
/// This trait is implemented by the db crate to provide actual database
/// operations. Callers treat every method as best-effort except `query`,
/// whose failure makes the managed provider fall back to enumerating storage.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Insert or replace the row for `metadata.id`.
    async fn upsert(&self, metadata: &SessionMetadata) -> StorageResult<()>;

    /// Remove the row for `id`. Absent rows are not an error.
    async fn remove(&self, id: &str) -> StorageResult<()>;

    /// Run `filter` server-side: match, order by `updated_at` desc, paginate.
    async fn query(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>>;
}

//! The storage provider contract.

use std::sync::Arc;

use async_trait::async_trait;
use psp_shared::{SessionFilter, SessionMetadata, StorageError, StorageResult, StoredSession};

/// Uniform persistence contract over [`StoredSession`] records.
///
/// All implementations must satisfy these invariants:
/// - `save` is an upsert keyed by `metadata.id` and is idempotent.
/// - `load` never returns a session whose id differs from the one requested.
/// - `delete` of an absent id succeeds.
/// - `list` returns metadata only, filtered, newest `updated_at` first.
/// - `exists` reports absence as `Ok(false)`; only infrastructure faults error.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short label used in logs and replication errors.
    fn name(&self) -> &str;

    /// Persist metadata and state.
    async fn save(&self, session: &StoredSession) -> StorageResult<()>;

    /// Fetch a session by id.
    async fn load(&self, id: &str) -> StorageResult<StoredSession>;

    /// Remove a session. Absent ids are not an error.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// List metadata matching `filter`.
    async fn list(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>>;

    /// Check whether a session exists.
    async fn exists(&self, id: &str) -> StorageResult<bool>;
}

/// Shared, type-erased provider handle.
pub type SharedProvider = Arc<dyn StorageProvider>;

/// Rejects ids that cannot be used safely as a storage key.
///
/// # Errors
///
/// Returns [`StorageError::Validation`] for empty ids, path separators,
/// `..` segments, or control characters.
pub fn check_id(id: &str) -> StorageResult<()> {
    if id.is_empty() {
        return Err(StorageError::validation("session id is empty"));
    }
    if id.contains(['/', '\\']) || id == "." || id == ".." || id.chars().any(char::is_control) {
        return Err(StorageError::validation(format!(
            "session id '{}' is not a valid storage key",
            id.escape_debug()
        )));
    }
    Ok(())
}

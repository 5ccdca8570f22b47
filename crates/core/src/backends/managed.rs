//! Managed backend: session blobs in platform object storage, metadata
//! mirrored into a relational table for filter pushdown.

use std::sync::Arc;

use async_trait::async_trait;
use opendal::Operator;
use psp_shared::{ManagedConfig, SessionFilter, SessionMetadata, StorageResult, StoredSession};
use tracing::{debug, warn};

use crate::index::MetadataIndex;
use crate::provider::{StorageProvider, check_id};
use crate::storage::{BlobStore, file_name, id_from_key, operator};

const BACKEND: &str = "managed";
const SESSIONS_DIR: &str = "sessions/";

/// Blob storage plus an optional metadata index.
///
/// Index writes are best-effort: a missing table or a database outage is
/// logged and never fails `save` or `delete`.
#[derive(Clone)]
pub struct ManagedProvider {
    blobs: BlobStore,
    index: Option<Arc<dyn MetadataIndex>>,
}

impl std::fmt::Debug for ManagedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProvider")
            .field("blobs", &self.blobs)
            .field("indexed", &self.index.is_some())
            .finish()
    }
}

impl ManagedProvider {
    /// Creates a provider over an existing operator.
    #[must_use]
    pub fn new(operator: Operator, index: Option<Arc<dyn MetadataIndex>>) -> Self {
        Self {
            blobs: BlobStore::new(operator, BACKEND),
            index,
        }
    }

    /// Creates a provider for the configured managed bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operator cannot be built.
    pub fn from_config(
        config: &ManagedConfig,
        index: Option<Arc<dyn MetadataIndex>>,
    ) -> StorageResult<Self> {
        Ok(Self::new(operator::managed(config)?, index))
    }

    /// Whether a metadata index is attached.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    fn key(id: &str) -> String {
        format!("{SESSIONS_DIR}{}", file_name(id))
    }

    async fn enumerate(&self) -> StorageResult<Vec<SessionMetadata>> {
        let entries = self
            .blobs
            .list_keys(SESSIONS_DIR, false)
            .await?
            .into_iter()
            .filter_map(|key| {
                let id = id_from_key(&key, "")?.to_string();
                Some((key, id))
            })
            .collect();
        self.blobs.collect_metadata(entries).await
    }
}

#[async_trait]
impl StorageProvider for ManagedProvider {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn save(&self, session: &StoredSession) -> StorageResult<()> {
        check_id(session.id())?;
        self.blobs
            .write_session(&Self::key(session.id()), session)
            .await?;

        if let Some(index) = &self.index
            && let Err(e) = index.upsert(&session.metadata).await
        {
            warn!(session_id = %session.id(), error = %e, "Metadata mirroring failed");
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> StorageResult<StoredSession> {
        check_id(id)?;
        self.blobs.read_session(&Self::key(id), id).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        check_id(id)?;
        self.blobs.delete(&Self::key(id), id).await?;

        if let Some(index) = &self.index
            && let Err(e) = index.remove(id).await
        {
            warn!(session_id = id, error = %e, "Metadata row removal failed");
        }
        Ok(())
    }

    async fn list(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>> {
        filter.validate()?;

        if !filter.is_empty()
            && let Some(index) = &self.index
        {
            match index.query(filter).await {
                Ok(items) => {
                    debug!(count = items.len(), "Listed sessions from metadata index");
                    return Ok(items);
                }
                Err(e) => {
                    warn!(error = %e, "Metadata index query failed, enumerating storage");
                }
            }
        }

        Ok(filter.apply(self.enumerate().await?))
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        check_id(id)?;
        self.blobs.exists(&Self::key(id), id).await
    }
}

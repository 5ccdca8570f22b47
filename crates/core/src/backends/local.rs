//! Local filesystem provider.
//!
//! Layout: `<base_dir>/<first two chars of id>/<id>.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use psp_shared::{SessionFilter, SessionMetadata, StorageResult, StoredSession};
use tracing::{debug, instrument};

use crate::provider::{StorageProvider, check_id};
use crate::storage::{BlobStore, file_name, id_from_key, operator};

const BACKEND: &str = "local";

/// One JSON file per session under a sharded directory.
#[derive(Debug, Clone)]
pub struct LocalFsProvider {
    base_dir: PathBuf,
    blobs: BlobStore,
}

impl LocalFsProvider {
    /// Creates a provider rooted at `base_dir`. The directory is created on first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot back a filesystem operator.
    pub fn new(base_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_dir = base_dir.into();
        let blobs = BlobStore::new(operator::filesystem(&base_dir)?, BACKEND);
        Ok(Self { base_dir, blobs })
    }

    /// Base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Shard directory name for `id`: its first two characters.
    #[must_use]
    pub fn shard(id: &str) -> &str {
        id.char_indices().nth(2).map_or(id, |(end, _)| &id[..end])
    }

    /// Key of the session file, relative to the base directory.
    #[must_use]
    pub fn key(id: &str) -> String {
        format!("{}/{}", Self::shard(id), file_name(id))
    }

    /// Absolute path of the session file.
    #[must_use]
    pub fn session_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(Self::shard(id)).join(file_name(id))
    }
}

#[async_trait]
impl StorageProvider for LocalFsProvider {
    fn name(&self) -> &str {
        BACKEND
    }

    #[instrument(skip_all, fields(session_id = %session.id()))]
    async fn save(&self, session: &StoredSession) -> StorageResult<()> {
        check_id(session.id())?;
        self.blobs
            .write_session(&Self::key(session.id()), session)
            .await?;
        debug!(path = %self.session_path(session.id()).display(), "Session written");
        Ok(())
    }

    async fn load(&self, id: &str) -> StorageResult<StoredSession> {
        check_id(id)?;
        self.blobs.read_session(&Self::key(id), id).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        check_id(id)?;
        self.blobs.delete(&Self::key(id), id).await
    }

    async fn list(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>> {
        filter.validate()?;

        // Only `<shard>/<id>.json` is a session file; anything deeper or
        // shallower was not written by this provider.
        let entries = self
            .blobs
            .list_keys("/", true)
            .await?
            .into_iter()
            .filter_map(|key| {
                let trimmed = key.trim_start_matches('/');
                let (shard, _) = trimmed.split_once('/')?;
                let id = id_from_key(trimmed, "")?;
                (trimmed.matches('/').count() == 1 && shard == Self::shard(id))
                    .then(|| (key.clone(), id.to_string()))
            })
            .collect();

        let items = self.blobs.collect_metadata(entries).await?;
        Ok(filter.apply(items))
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        check_id(id)?;
        self.blobs.exists(&Self::key(id), id).await
    }
}

//! Session blobs on top of an OpenDAL operator.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Apache OpenDAL                              │
//! │                   (Unified Storage API)                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ op.write(key, json)        │ op.list_with(dir).recursive(..)    │
//! │ op.read(key)               │ op.stat(key)                       │
//! │ op.delete(key)             │                                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use opendal::{ErrorKind, Operator};
use psp_shared::{SessionMetadata, StorageError, StorageResult, StoredSession};
use tracing::{error, warn};

use super::error::{from_opendal, unavailable};
use crate::codec;

/// Suffix of every session object key.
pub const SESSION_SUFFIX: &str = ".json";

/// One JSON object per session, addressed by key.
#[derive(Clone)]
pub struct BlobStore {
    operator: Operator,
    backend: &'static str,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl BlobStore {
    /// Wraps an operator. `backend` labels errors and log lines.
    #[must_use]
    pub const fn new(operator: Operator, backend: &'static str) -> Self {
        Self { operator, backend }
    }

    /// Backend label.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        self.backend
    }

    /// Encodes and writes `session` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub async fn write_session(&self, key: &str, session: &StoredSession) -> StorageResult<()> {
        let bytes = codec::encode(session)?;
        self.operator
            .write(key, bytes)
            .await
            .map(|_| ())
            .map_err(|e| from_opendal(self.backend, session.id(), &e))
    }

    /// Reads and decodes the session stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object is missing and `Serialization` if it
    /// cannot be decoded.
    pub async fn read_session(&self, key: &str, id: &str) -> StorageResult<StoredSession> {
        let bytes = self.read(key, id).await?;
        codec::decode(&bytes, id).inspect_err(|e| {
            error!(
                backend = self.backend,
                key,
                session_id = id,
                error = %e,
                "Corrupt session payload"
            );
        })
    }

    /// Reads only the metadata of the session stored under `key`.
    ///
    /// # Errors
    ///
    /// Same as [`BlobStore::read_session`].
    pub async fn read_metadata(&self, key: &str, id: &str) -> StorageResult<SessionMetadata> {
        let bytes = self.read(key, id).await?;
        codec::decode_metadata(&bytes, id).inspect_err(|e| {
            error!(
                backend = self.backend,
                key,
                session_id = id,
                error = %e,
                "Corrupt session payload"
            );
        })
    }

    async fn read(&self, key: &str, id: &str) -> StorageResult<Vec<u8>> {
        self.operator
            .read(key)
            .await
            .map(|buf| buf.to_vec())
            .map_err(|e| from_opendal(self.backend, id, &e))
    }

    /// Deletes the object under `key`. Missing objects are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub async fn delete(&self, key: &str, id: &str) -> StorageResult<()> {
        match self.operator.delete(key).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(from_opendal(self.backend, id, &e)),
        }
    }

    /// Check if an object exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    pub async fn exists(&self, key: &str, id: &str) -> StorageResult<bool> {
        match self.operator.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(from_opendal(self.backend, id, &e)),
        }
    }

    /// Lists session object keys under `dir`.
    ///
    /// Only files ending in [`SESSION_SUFFIX`] are returned. A missing
    /// directory lists as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn list_keys(&self, dir: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let entries = match self.operator.list_with(dir).recursive(recursive).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unavailable(self.backend, &e)),
        };

        Ok(entries
            .into_iter()
            .filter(|entry| entry.metadata().mode().is_file())
            .map(|entry| entry.path().to_string())
            .filter(|path| path.ends_with(SESSION_SUFFIX))
            .collect())
    }

    /// Loads metadata for each `(key, id)` pair (N+1 reads).
    ///
    /// Objects that vanished or fail to decode are skipped and logged so
    /// one bad object does not hide the rest.
    ///
    /// # Errors
    ///
    /// Returns an error on the first backend fault.
    pub async fn collect_metadata(
        &self,
        entries: Vec<(String, String)>,
    ) -> StorageResult<Vec<SessionMetadata>> {
        let mut items = Vec::with_capacity(entries.len());
        for (key, id) in entries {
            match self.read_metadata(&key, &id).await {
                Ok(meta) => items.push(meta),
                Err(e) if e.is_not_found() => {
                    warn!(backend = self.backend, key, "Session vanished during listing");
                }
                Err(StorageError::Serialization(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(items)
    }
}

/// File name of the session object for `id`.
#[must_use]
pub fn file_name(id: &str) -> String {
    format!("{id}{SESSION_SUFFIX}")
}

/// Extracts the session id from an object key, given the name prefix that
/// precedes it in the last path segment.
#[must_use]
pub fn id_from_key<'a>(key: &'a str, name_prefix: &str) -> Option<&'a str> {
    let name = key.rsplit('/').next()?;
    let id = name.strip_prefix(name_prefix)?.strip_suffix(SESSION_SUFFIX)?;
    (!id.is_empty()).then_some(id)
}

//! S3-compatible object storage provider.
//!
//! Key: `<prefix><id>.json`. The prefix may end in a partial file name
//! (`tenants/a/psp-`), so it is split into a directory part used for
//! listing and a name part matched against each listed file.

use async_trait::async_trait;
use opendal::Operator;
use psp_shared::{S3Config, SessionFilter, SessionMetadata, StorageResult, StoredSession};
use tracing::debug;

use crate::provider::{StorageProvider, check_id};
use crate::storage::{BlobStore, id_from_key, operator};

const BACKEND: &str = "s3";

/// One JSON object per session in a bucket, under a key prefix.
#[derive(Debug, Clone)]
pub struct ObjectStorageProvider {
    blobs: BlobStore,
    dir: String,
    name_prefix: String,
}

impl ObjectStorageProvider {
    /// Creates a provider over an existing operator.
    #[must_use]
    pub fn new(operator: Operator, prefix: &str) -> Self {
        let prefix = prefix.trim_start_matches('/');
        let (dir, name_prefix) = match prefix.rfind('/') {
            Some(idx) => prefix.split_at(idx + 1),
            None => ("", prefix),
        };
        Self {
            blobs: BlobStore::new(operator, BACKEND),
            dir: dir.to_string(),
            name_prefix: name_prefix.to_string(),
        }
    }

    /// Creates a provider for an S3-compatible bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the operator cannot be built.
    pub fn from_config(config: &S3Config) -> StorageResult<Self> {
        Ok(Self::new(operator::s3(config)?, &config.prefix))
    }

    /// Object key for `id`.
    #[must_use]
    pub fn key(&self, id: &str) -> String {
        format!("{}{}{id}.json", self.dir, self.name_prefix)
    }
}

#[async_trait]
impl StorageProvider for ObjectStorageProvider {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn save(&self, session: &StoredSession) -> StorageResult<()> {
        check_id(session.id())?;
        self.blobs
            .write_session(&self.key(session.id()), session)
            .await
    }

    async fn load(&self, id: &str) -> StorageResult<StoredSession> {
        check_id(id)?;
        self.blobs.read_session(&self.key(id), id).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        check_id(id)?;
        self.blobs.delete(&self.key(id), id).await
    }

    async fn list(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>> {
        filter.validate()?;

        let list_dir = if self.dir.is_empty() { "/" } else { &self.dir };
        let entries: Vec<(String, String)> = self
            .blobs
            .list_keys(list_dir, false)
            .await?
            .into_iter()
            .filter_map(|key| {
                let id = id_from_key(&key, &self.name_prefix)?.to_string();
                Some((key, id))
            })
            .collect();

        debug!(prefix = %self.key("*"), count = entries.len(), "Listed session objects");
        let items = self.blobs.collect_metadata(entries).await?;
        Ok(filter.apply(items))
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        check_id(id)?;
        self.blobs.exists(&self.key(id), id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psp_shared::{BrowserSessionState, StorageError};
    use rstest::rstest;

    fn provider(prefix: &str) -> ObjectStorageProvider {
        ObjectStorageProvider::new(operator::memory().expect("memory operator"), prefix)
    }

    fn session(id: &str, tags: &[&str], updated: i64) -> StoredSession {
        let mut meta = SessionMetadata::new(id).with_tags(tags.iter().copied());
        meta.id = id.to_string();
        meta.updated_at = updated;
        StoredSession::new(meta, BrowserSessionState::new())
    }

    #[rstest]
    #[case("", "abc.json")]
    #[case("sessions/", "sessions/abc.json")]
    #[case("/sessions/", "sessions/abc.json")]
    #[case("tenants/a/psp-", "tenants/a/psp-abc.json")]
    #[case("psp-", "psp-abc.json")]
    fn test_key_layout(#[case] prefix: &str, #[case] key: &str) {
        assert_eq!(provider(prefix).key("abc"), key);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let provider = provider("sessions/");
        let s = session("abc", &["x"], 1);
        provider.save(&s).await.expect("save");
        assert_eq!(provider.load("abc").await.expect("load"), s);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let err = provider("sessions/").load("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_respects_name_prefix_and_filter() {
        let operator = operator::memory().expect("memory operator");
        let ours = ObjectStorageProvider::new(operator.clone(), "tenants/a/psp-");
        let theirs = ObjectStorageProvider::new(operator, "tenants/a/other-");

        ours.save(&session("one", &["a", "b"], 10)).await.expect("save");
        ours.save(&session("two", &["a"], 20)).await.expect("save");
        ours.save(&session("three", &["a", "b"], 30)).await.expect("save");
        theirs.save(&session("foreign", &["a", "b"], 99)).await.expect("save");

        let listed = ours
            .list(&SessionFilter::all().with_tags(["a", "b"]))
            .await
            .expect("list");
        let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["three", "one"]);
    }

    #[tokio::test]
    async fn test_delete_then_exists() {
        let provider = provider("");
        provider.save(&session("gone", &[], 1)).await.expect("save");
        provider.delete("gone").await.expect("delete");
        provider.delete("gone").await.expect("delete again");
        assert!(!provider.exists("gone").await.expect("exists"));
    }
}

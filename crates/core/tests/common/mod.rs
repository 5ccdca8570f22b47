//! Instrumented in-memory provider shared by the orchestrator tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use psp_core::StorageProvider;
use psp_shared::{
    BrowserSessionState, SessionFilter, SessionMetadata, StorageError, StorageResult,
    StoredSession,
};

/// Operation counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub save: AtomicUsize,
    pub load: AtomicUsize,
    pub delete: AtomicUsize,
    pub list: AtomicUsize,
    pub exists: AtomicUsize,
}

impl Calls {
    pub fn total(&self) -> usize {
        [&self.save, &self.load, &self.delete, &self.list, &self.exists]
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }
}

/// In-memory provider with call counting and failure injection.
#[derive(Debug, Default)]
pub struct StubProvider {
    name: String,
    sessions: Mutex<HashMap<String, StoredSession>>,
    pub calls: Calls,
    fail_all: AtomicBool,
    fail_saves: AtomicBool,
    save_delay: Mutex<Option<Duration>>,
}

impl StubProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Self::default()
        })
    }

    /// Every operation fails with `BackendUnavailable`.
    pub fn failing(name: &str) -> Arc<Self> {
        let stub = Self::new(name);
        stub.fail_all.store(true, Ordering::SeqCst);
        stub
    }

    /// Only `save` fails.
    pub fn failing_saves(name: &str) -> Arc<Self> {
        let stub = Self::new(name);
        stub.fail_saves.store(true, Ordering::SeqCst);
        stub
    }

    /// `save` sleeps before writing.
    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        let stub = Self::new(name);
        *stub.save_delay.lock().unwrap() = Some(delay);
        stub
    }

    /// Stores a session without counting a call.
    pub fn seed(&self, session: StoredSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id().to_string(), session);
    }

    /// Stored copy, read without counting a call.
    pub fn get(&self, id: &str) -> Option<StoredSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check(&self) -> StorageResult<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(&self.name, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save(&self, session: &StoredSession) -> StorageResult<()> {
        self.calls.save.fetch_add(1, Ordering::SeqCst);
        let delay = *self.save_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(&self.name, "injected save failure"));
        }
        self.seed(session.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> StorageResult<StoredSession> {
        self.calls.load.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.get(id).ok_or_else(|| StorageError::not_found(id))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.sessions.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let items = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .map(|s| s.metadata.clone())
            .collect();
        Ok(filter.apply(items))
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        self.calls.exists.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.sessions.lock().unwrap().contains_key(id))
    }
}

/// Session with a fixed id, tags and `updated_at`.
pub fn session(id: &str, tags: &[&str], updated_at: i64) -> StoredSession {
    let mut meta = SessionMetadata::new(format!("session {id}")).with_tags(tags.iter().copied());
    meta.id = id.to_string();
    meta.created_at = updated_at;
    meta.updated_at = updated_at;
    StoredSession::new(meta, BrowserSessionState::new().with_origin("https://example.com"))
}

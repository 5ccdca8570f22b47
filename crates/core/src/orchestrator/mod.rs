//! Storage orchestrator: one primary, zero or more secondaries.
//!
//! The orchestrator is itself a [`StorageProvider`], so callers cannot tell
//! a single backend from an orchestrated set. On top of the primary it adds:
//!
//! - a read-through cache with TTL and write-order eviction,
//! - replication of `save`/`delete` to secondaries (awaited under strict
//!   consistency, detached otherwise),
//! - fallback reads through the secondaries with read-repair,
//! - explicit timestamp-based reconciliation ([`StorageOrchestrator::sync_all`]).
//!
//! The primary is the source of truth: whenever the whole chain fails, the
//! primary's error is the one returned.

mod cache;
mod sync;

use std::iter;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use psp_shared::{
    OrchestratorOptions, SessionFilter, SessionMetadata, StorageError, StorageResult,
    StoredSession,
};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

pub use cache::{Clock, ManualClock, SystemClock};
pub use sync::SyncReport;

use crate::provider::{SharedProvider, StorageProvider};
use cache::SessionCache;

const NAME: &str = "orchestrator";

/// A write fanned out to secondaries.
#[derive(Debug, Clone)]
enum Replica {
    Save(StoredSession),
    Delete(String),
}

impl Replica {
    fn id(&self) -> &str {
        match self {
            Self::Save(session) => session.id(),
            Self::Delete(id) => id,
        }
    }

    async fn apply(&self, provider: &dyn StorageProvider) -> StorageResult<()> {
        match self {
            Self::Save(session) => provider.save(session).await,
            Self::Delete(id) => provider.delete(id).await,
        }
    }
}

/// Composite provider adding caching, replication, fallback and reconciliation.
pub struct StorageOrchestrator {
    primary: SharedProvider,
    secondaries: Vec<SharedProvider>,
    options: OrchestratorOptions,
    cache: Option<SessionCache>,
    tasks: TaskTracker,
}

impl std::fmt::Debug for StorageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageOrchestrator")
            .field("primary", &self.primary.name())
            .field(
                "secondaries",
                &self.secondaries.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl StorageOrchestrator {
    /// Composes `primary` and `secondaries` using the wall clock.
    #[must_use]
    pub fn new(
        primary: SharedProvider,
        secondaries: Vec<SharedProvider>,
        options: OrchestratorOptions,
    ) -> Self {
        Self::with_clock(primary, secondaries, options, Arc::new(SystemClock))
    }

    /// Composes providers with an explicit cache clock.
    #[must_use]
    pub fn with_clock(
        primary: SharedProvider,
        secondaries: Vec<SharedProvider>,
        options: OrchestratorOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = options.use_cache.then(|| {
            SessionCache::new(
                Duration::from_secs(options.cache_ttl_secs),
                options.cache_capacity,
                clock,
            )
        });
        Self {
            primary,
            secondaries,
            options,
            cache,
            tasks: TaskTracker::new(),
        }
    }

    /// The source-of-truth provider.
    #[must_use]
    pub fn primary(&self) -> &SharedProvider {
        &self.primary
    }

    /// Secondaries in fallback order.
    #[must_use]
    pub fn secondaries(&self) -> &[SharedProvider] {
        &self.secondaries
    }

    /// Behavioral options.
    #[must_use]
    pub const fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Number of cached sessions, including ones not yet found expired.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, SessionCache::len)
    }

    /// Drops every cached session.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Number of background replication and read-repair tasks still running.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every background replication and read-repair task.
    ///
    /// Call before shutdown; detached writes still in flight are otherwise
    /// lost when the runtime stops.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn remember(&self, session: &StoredSession) {
        if let Some(cache) = &self.cache {
            cache.insert(session.clone());
        }
    }

    fn cached(&self, id: &str) -> Option<StoredSession> {
        self.cache.as_ref().and_then(|cache| cache.get(id))
    }

    /// Applies `op` to every secondary under the consistency policy.
    async fn replicate(&self, op: Replica) -> StorageResult<()> {
        if !self.options.replicate || self.secondaries.is_empty() {
            return Ok(());
        }

        if !self.options.strict_consistency {
            self.spawn_replicas(&op, self.secondaries.iter().cloned(), "replication");
            return Ok(());
        }

        let results = join_all(
            self.secondaries
                .iter()
                .map(|secondary| op.apply(secondary.as_ref())),
        )
        .await;

        for (secondary, result) in self.secondaries.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    provider = secondary.name(),
                    session_id = op.id(),
                    error = %e,
                    "Strict replication failed"
                );
                return Err(StorageError::replication(secondary.name(), e));
            }
        }
        Ok(())
    }

    /// Detaches `op` against each target; failures are logged only.
    fn spawn_replicas(
        &self,
        op: &Replica,
        targets: impl IntoIterator<Item = SharedProvider>,
        purpose: &'static str,
    ) {
        for target in targets {
            let op = op.clone();
            self.tasks.spawn(async move {
                match op.apply(target.as_ref()).await {
                    Ok(()) => {
                        debug!(
                            provider = target.name(),
                            session_id = op.id(),
                            purpose,
                            "Background write done"
                        );
                    }
                    Err(e) => {
                        warn!(
                            provider = target.name(),
                            session_id = op.id(),
                            purpose,
                            error = %e,
                            "Background write failed"
                        );
                    }
                }
            });
        }
    }

    /// Pushes a session recovered from `secondaries[served_by]` back to the
    /// primary and, when replicating, to the other secondaries.
    fn read_repair(&self, session: &StoredSession, served_by: usize) {
        let others = self
            .secondaries
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.options.replicate && *idx != served_by)
            .map(|(_, p)| Arc::clone(p));
        let targets: Vec<_> = iter::once(Arc::clone(&self.primary)).chain(others).collect();
        self.spawn_replicas(&Replica::Save(session.clone()), targets, "read-repair");
    }
}

#[async_trait]
impl StorageProvider for StorageOrchestrator {
    fn name(&self) -> &str {
        NAME
    }

    async fn save(&self, session: &StoredSession) -> StorageResult<()> {
        self.primary.save(session).await?;
        self.remember(session);
        self.replicate(Replica::Save(session.clone())).await
    }

    async fn load(&self, id: &str) -> StorageResult<StoredSession> {
        if let Some(session) = self.cached(id) {
            debug!(session_id = id, "Cache hit");
            return Ok(session);
        }

        let primary_err = match self.primary.load(id).await {
            Ok(session) => {
                self.remember(&session);
                return Ok(session);
            }
            Err(e) => e,
        };
        if !primary_err.is_not_found() {
            warn!(
                provider = self.primary.name(),
                session_id = id,
                error = %primary_err,
                "Primary load failed, trying secondaries"
            );
        }

        for (idx, secondary) in self.secondaries.iter().enumerate() {
            match secondary.load(id).await {
                Ok(session) => {
                    debug!(provider = secondary.name(), session_id = id, "Served from secondary");
                    self.remember(&session);
                    self.read_repair(&session, idx);
                    return Ok(session);
                }
                Err(e) => {
                    debug!(
                        provider = secondary.name(),
                        session_id = id,
                        error = %e,
                        "Secondary load failed"
                    );
                }
            }
        }

        Err(primary_err)
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        if let Some(cache) = &self.cache {
            cache.invalidate(id);
        }
        self.primary.delete(id).await?;
        self.replicate(Replica::Delete(id.to_string())).await
    }

    async fn list(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>> {
        filter.validate()?;

        let primary_err = match self.primary.list(filter).await {
            Ok(items) => return Ok(items),
            Err(e) => e,
        };
        warn!(
            provider = self.primary.name(),
            error = %primary_err,
            "Primary list failed, trying secondaries"
        );

        for secondary in &self.secondaries {
            match secondary.list(filter).await {
                Ok(items) => return Ok(items),
                Err(e) => {
                    debug!(provider = secondary.name(), error = %e, "Secondary list failed");
                }
            }
        }

        Err(primary_err)
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        if self.cached(id).is_some() {
            return Ok(true);
        }

        for provider in iter::once(&self.primary).chain(&self.secondaries) {
            match provider.exists(id).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    debug!(
                        provider = provider.name(),
                        session_id = id,
                        error = %e,
                        "Exists check failed"
                    );
                }
            }
        }
        Ok(false)
    }
}

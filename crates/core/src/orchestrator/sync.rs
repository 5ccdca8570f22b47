//! Timestamp-based reconciliation between the primary and its secondaries.

use std::collections::{BTreeMap, HashMap};

use psp_shared::{SessionFilter, StorageResult};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::StorageOrchestrator;
use crate::provider::SharedProvider;

/// Outcome counters of one [`StorageOrchestrator::sync_all`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Newer secondary copies written into the primary.
    pub pulled: usize,
    /// Primary copies written to a secondary that was older or missing them.
    pub pushed: usize,
    /// Pairs already at the same `updated_at`.
    pub unchanged: usize,
    /// Sessions whose transfer failed.
    pub failed: usize,
    /// Secondaries that could not be listed and were skipped.
    pub skipped_providers: usize,
}

impl SyncReport {
    /// True when nothing failed and no provider was skipped.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped_providers == 0
    }
}

#[derive(Debug, Clone, Copy)]
enum Transfer {
    Pulled,
    Pushed,
    Unchanged,
}

impl StorageOrchestrator {
    /// Reconciles every secondary against the primary.
    ///
    /// For each session the copy with the strictly greater `updated_at`
    /// wins; equal timestamps leave both sides alone. Sessions that only a
    /// secondary holds are copied into the primary. Secondaries are visited
    /// in order, so a copy pulled from one is pushed to the ones after it.
    ///
    /// Per-session failures are logged and counted; the pass continues.
    ///
    /// # Errors
    ///
    /// Returns the primary's error if the primary cannot be listed.
    pub async fn sync_all(&self) -> StorageResult<SyncReport> {
        let all = SessionFilter::all();
        let mut known: HashMap<String, i64> = self
            .primary
            .list(&all)
            .await?
            .into_iter()
            .map(|meta| (meta.id, meta.updated_at))
            .collect();
        let mut report = SyncReport::default();

        for secondary in &self.secondaries {
            let theirs: BTreeMap<String, i64> = match secondary.list(&all).await {
                Ok(items) => items
                    .into_iter()
                    .map(|meta| (meta.id, meta.updated_at))
                    .collect(),
                Err(e) => {
                    warn!(
                        provider = secondary.name(),
                        error = %e,
                        "Skipping secondary during sync"
                    );
                    report.skipped_providers += 1;
                    continue;
                }
            };

            let mut ours: Vec<(String, i64)> =
                known.iter().map(|(id, at)| (id.clone(), *at)).collect();
            ours.sort_unstable();

            for (id, our_at) in ours {
                let outcome = match theirs.get(&id) {
                    Some(&their_at) if their_at > our_at => self
                        .pull(secondary, &id)
                        .await
                        .map(|at| {
                            known.insert(id.clone(), at);
                            Transfer::Pulled
                        }),
                    Some(&their_at) if their_at == our_at => Ok(Transfer::Unchanged),
                    _ => self.push(secondary, &id).await.map(|()| Transfer::Pushed),
                };
                record(&mut report, secondary, &id, outcome);
            }

            let only_theirs: Vec<String> = theirs
                .keys()
                .filter(|id| !known.contains_key(*id))
                .cloned()
                .collect();
            for id in only_theirs {
                let outcome = self.pull(secondary, &id).await.map(|at| {
                    known.insert(id.clone(), at);
                    Transfer::Pulled
                });
                record(&mut report, secondary, &id, outcome);
            }
        }

        info!(
            pulled = report.pulled,
            pushed = report.pushed,
            unchanged = report.unchanged,
            failed = report.failed,
            skipped_providers = report.skipped_providers,
            "Sync pass finished"
        );
        Ok(report)
    }

    /// Copies the secondary's session into the primary and the cache.
    /// Returns the pulled `updated_at`.
    async fn pull(&self, secondary: &SharedProvider, id: &str) -> StorageResult<i64> {
        let session = secondary.load(id).await?;
        self.primary.save(&session).await?;
        self.remember(&session);
        Ok(session.updated_at())
    }

    /// Copies the primary's session to the secondary.
    async fn push(&self, secondary: &SharedProvider, id: &str) -> StorageResult<()> {
        let session = self.primary.load(id).await?;
        secondary.save(&session).await
    }
}

fn record(
    report: &mut SyncReport,
    secondary: &SharedProvider,
    id: &str,
    outcome: StorageResult<Transfer>,
) {
    match outcome {
        Ok(Transfer::Pulled) => {
            debug!(provider = secondary.name(), session_id = id, "Pulled newer copy into primary");
            report.pulled += 1;
        }
        Ok(Transfer::Pushed) => {
            debug!(provider = secondary.name(), session_id = id, "Pushed primary copy");
            report.pushed += 1;
        }
        Ok(Transfer::Unchanged) => report.unchanged += 1,
        Err(e) => {
            warn!(provider = secondary.name(), session_id = id, error = %e, "Sync transfer failed");
            report.failed += 1;
        }
    }
}

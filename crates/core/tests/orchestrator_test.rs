//! Orchestrator behavior against instrumented stub providers.
//!
//! Covers caching (TTL short-circuit, write-order eviction), fallback reads
//! with read-repair, strict and detached replication, and the list / exists
//! fallback chains.

#![allow(clippy::similar_names)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{StubProvider, session};
use psp_core::{ManualClock, SharedProvider, StorageOrchestrator, StorageProvider};
use psp_shared::{OrchestratorOptions, SessionFilter, StorageError};

fn options() -> OrchestratorOptions {
    OrchestratorOptions::default()
}

fn shared(stub: &Arc<StubProvider>) -> SharedProvider {
    stub.clone()
}

fn orchestrator(
    primary: &Arc<StubProvider>,
    secondaries: &[&Arc<StubProvider>],
    options: OrchestratorOptions,
) -> (StorageOrchestrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let orch = StorageOrchestrator::with_clock(
        shared(primary),
        secondaries.iter().map(|s| shared(s)).collect(),
        options,
        clock.clone(),
    );
    (orch, clock)
}

// =========================================================================
// Cache
// =========================================================================

#[tokio::test]
async fn test_cache_short_circuits_until_ttl() {
    let primary = StubProvider::new("primary");
    primary.seed(session("a", &[], 1));
    let (orch, clock) = orchestrator(&primary, &[], options().with_cache_ttl(10));

    orch.load("a").await.expect("first load");
    assert_eq!(StubProvider::count(&primary.calls.load), 1);

    clock.advance(Duration::from_millis(9_999));
    orch.load("a").await.expect("cached load");
    assert_eq!(StubProvider::count(&primary.calls.load), 1);

    clock.advance(Duration::from_millis(1));
    orch.load("a").await.expect("expired load");
    assert_eq!(StubProvider::count(&primary.calls.load), 2);
}

#[tokio::test]
async fn test_cache_evicts_oldest_refresh() {
    let primary = StubProvider::new("primary");
    for id in ["a", "b", "c"] {
        primary.seed(session(id, &[], 1));
    }
    let (orch, clock) = orchestrator(&primary, &[], options().with_cache_capacity(2));

    for id in ["a", "b", "c"] {
        orch.load(id).await.expect("load");
        clock.advance(Duration::from_secs(1));
    }
    assert_eq!(StubProvider::count(&primary.calls.load), 3);
    assert_eq!(orch.cache_len(), 2);

    orch.load("b").await.expect("cached");
    orch.load("c").await.expect("cached");
    assert_eq!(StubProvider::count(&primary.calls.load), 3);

    orch.load("a").await.expect("evicted id reloads");
    assert_eq!(StubProvider::count(&primary.calls.load), 4);
}

#[tokio::test]
async fn test_save_refreshes_cache() {
    let primary = StubProvider::new("primary");
    let (orch, _clock) = orchestrator(&primary, &[], options());

    orch.save(&session("a", &[], 1)).await.expect("save");
    let loaded = orch.load("a").await.expect("load");
    assert_eq!(loaded.updated_at(), 1);
    assert_eq!(StubProvider::count(&primary.calls.load), 0);
}

#[tokio::test]
async fn test_cache_disabled_always_hits_backend() {
    let primary = StubProvider::new("primary");
    primary.seed(session("a", &[], 1));
    let (orch, _clock) = orchestrator(&primary, &[], options().with_cache(false));

    orch.load("a").await.expect("load");
    orch.load("a").await.expect("load");
    assert_eq!(StubProvider::count(&primary.calls.load), 2);
    assert_eq!(orch.cache_len(), 0);
}

#[tokio::test]
async fn test_delete_invalidates_cache() {
    let primary = StubProvider::new("primary");
    let (orch, _clock) = orchestrator(&primary, &[], options());

    orch.save(&session("a", &[], 1)).await.expect("save");
    orch.delete("a").await.expect("delete");

    assert!(orch.load("a").await.unwrap_err().is_not_found());
    assert!(!orch.exists("a").await.expect("exists"));
}

#[tokio::test]
async fn test_clear_cache_forces_reload() {
    let primary = StubProvider::new("primary");
    let (orch, _clock) = orchestrator(&primary, &[], options());
    orch.save(&session("a", &[], 1)).await.expect("save");

    orch.clear_cache();
    assert_eq!(orch.cache_len(), 0);
    orch.load("a").await.expect("load");
    assert_eq!(StubProvider::count(&primary.calls.load), 1);
}

// =========================================================================
// Save and replication
// =========================================================================

#[tokio::test]
async fn test_primary_save_failure_propagates_and_skips_secondaries() {
    let primary = StubProvider::failing("primary");
    let secondary = StubProvider::new("secondary");
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options());

    let err = orch.save(&session("a", &[], 1)).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::BackendUnavailable { backend, .. } if backend == "primary"
    ));

    orch.drain().await;
    assert_eq!(StubProvider::count(&secondary.calls.save), 0);
    assert_eq!(orch.cache_len(), 0);
}

#[tokio::test]
async fn test_strict_replication_fails_on_bad_secondary() {
    let primary = StubProvider::new("primary");
    let good = StubProvider::new("good");
    let bad = StubProvider::failing_saves("bad");
    let (orch, _clock) = orchestrator(
        &primary,
        &[&good, &bad],
        options().with_strict_consistency(true),
    );

    let err = orch.save(&session("a", &[], 1)).await.unwrap_err();
    assert!(matches!(
        &err,
        StorageError::ReplicationFailure { provider, .. } if provider == "bad"
    ));
    assert_eq!(err.error_code(), "REPLICATION_FAILURE");
    // The primary write is not rolled back.
    assert!(primary.get("a").is_some());
    assert!(good.get("a").is_some());
}

#[tokio::test]
async fn test_non_strict_replication_tolerates_bad_secondary() {
    let primary = StubProvider::new("primary");
    let good = StubProvider::new("good");
    let bad = StubProvider::failing_saves("bad");
    let (orch, _clock) = orchestrator(&primary, &[&good, &bad], options());

    orch.save(&session("a", &[], 1)).await.expect("save resolves");
    orch.drain().await;

    assert!(good.get("a").is_some());
    assert_eq!(StubProvider::count(&bad.calls.save), 1);
    assert_eq!(orch.pending_tasks(), 0);
}

#[tokio::test]
async fn test_non_strict_save_does_not_wait_for_secondaries() {
    let primary = StubProvider::new("primary");
    let slow = StubProvider::slow("slow", Duration::from_millis(200));
    let (orch, _clock) = orchestrator(&primary, &[&slow], options());

    orch.save(&session("a", &[], 1)).await.expect("save");
    assert!(slow.get("a").is_none());

    orch.drain().await;
    assert!(slow.get("a").is_some());
}

#[tokio::test]
async fn test_replicate_off_writes_primary_only() {
    let primary = StubProvider::new("primary");
    let secondary = StubProvider::new("secondary");
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options().with_replication(false));

    orch.save(&session("a", &[], 1)).await.expect("save");
    orch.delete("a").await.expect("delete");
    orch.drain().await;
    assert_eq!(secondary.calls.total(), 0);
}

#[tokio::test]
async fn test_strict_delete_reaches_every_secondary() {
    let primary = StubProvider::new("primary");
    let s1 = StubProvider::new("s1");
    let s2 = StubProvider::new("s2");
    for stub in [&primary, &s1, &s2] {
        stub.seed(session("a", &[], 1));
    }
    let (orch, _clock) =
        orchestrator(&primary, &[&s1, &s2], options().with_strict_consistency(true));

    orch.delete("a").await.expect("delete");
    assert!(primary.get("a").is_none());
    assert!(s1.get("a").is_none());
    assert!(s2.get("a").is_none());
}

#[tokio::test]
async fn test_delete_missing_id_is_idempotent() {
    let primary = StubProvider::new("primary");
    let secondary = StubProvider::new("secondary");
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options());

    orch.delete("never").await.expect("delete");
    orch.drain().await;
    assert!(!orch.exists("never").await.expect("exists"));
}

// =========================================================================
// Fallback reads and read-repair
// =========================================================================

#[tokio::test]
async fn test_fallback_load_triggers_read_repair() {
    let primary = StubProvider::failing("primary");
    let secondary = StubProvider::new("secondary");
    let x = session("x", &["a"], 7);
    secondary.seed(x.clone());
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options());

    let loaded = orch.load("x").await.expect("fallback load");
    assert_eq!(loaded, x);

    orch.drain().await;
    assert_eq!(StubProvider::count(&primary.calls.save), 1);
}

#[tokio::test]
async fn test_read_repair_heals_primary_and_other_secondaries() {
    let primary = StubProvider::new("primary");
    let empty = StubProvider::new("empty");
    let holder = StubProvider::new("holder");
    let x = session("x", &[], 3);
    holder.seed(x.clone());
    let (orch, _clock) = orchestrator(&primary, &[&empty, &holder], options());

    assert_eq!(orch.load("x").await.expect("load"), x);
    orch.drain().await;

    assert_eq!(primary.get("x"), Some(x.clone()));
    assert_eq!(empty.get("x"), Some(x));
    // The secondary that served the read is not written back to.
    assert_eq!(StubProvider::count(&holder.calls.save), 0);
}

#[tokio::test]
async fn test_read_repair_failure_still_returns_session() {
    let primary = StubProvider::failing("primary");
    let secondary = StubProvider::new("secondary");
    secondary.seed(session("x", &[], 1));
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options());

    assert!(orch.load("x").await.is_ok());
    orch.drain().await;
    assert!(primary.get("x").is_none());
}

#[tokio::test]
async fn test_all_providers_failing_surfaces_primary_error() {
    let primary = StubProvider::failing("primary");
    let s1 = StubProvider::new("s1");
    let s2 = StubProvider::failing("s2");
    let (orch, _clock) = orchestrator(&primary, &[&s1, &s2], options());

    let err = orch.load("x").await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::BackendUnavailable { backend, .. } if backend == "primary"
    ));
}

#[tokio::test]
async fn test_not_found_everywhere_is_not_found() {
    let primary = StubProvider::new("primary");
    let secondary = StubProvider::new("secondary");
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options());

    let err = orch.load("ghost").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { id } if id == "ghost"));
    assert_eq!(StubProvider::count(&secondary.calls.load), 1);
}

// =========================================================================
// List and exists
// =========================================================================

fn seed_five(stub: &StubProvider) {
    for (id, tags, updated) in [
        ("s1", vec!["a", "b"], 10),
        ("s2", vec!["a"], 20),
        ("s3", vec!["a", "b"], 30),
        ("s4", vec!["b", "c"], 40),
        ("s5", vec!["a", "b", "c"], 50),
    ] {
        stub.seed(session(id, &tags, updated));
    }
}

#[tokio::test]
async fn test_list_filter_semantics() {
    let primary = StubProvider::new("primary");
    seed_five(&primary);
    let (orch, _clock) = orchestrator(&primary, &[], options());

    let tagged = orch
        .list(&SessionFilter::all().with_tags(["a", "b"]))
        .await
        .expect("list");
    let ids: Vec<_> = tagged.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["s5", "s3", "s1"]);

    let page = orch
        .list(&SessionFilter::all().paginate(2, 1))
        .await
        .expect("list");
    let ids: Vec<_> = page.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["s4", "s3"]);
}

#[tokio::test]
async fn test_list_falls_back_and_is_not_cached() {
    let primary = StubProvider::failing("primary");
    let secondary = StubProvider::new("secondary");
    seed_five(&secondary);
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options());

    assert_eq!(orch.list(&SessionFilter::all()).await.expect("list").len(), 5);
    assert_eq!(orch.list(&SessionFilter::all()).await.expect("list").len(), 5);
    assert_eq!(StubProvider::count(&secondary.calls.list), 2);
    assert_eq!(orch.cache_len(), 0);
}

#[tokio::test]
async fn test_list_all_failing_surfaces_primary_error() {
    let primary = StubProvider::failing("primary");
    let secondary = StubProvider::failing("secondary");
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options());

    let err = orch.list(&SessionFilter::all()).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::BackendUnavailable { backend, .. } if backend == "primary"
    ));
}

#[tokio::test]
async fn test_list_rejects_invalid_filter() {
    let primary = StubProvider::new("primary");
    let (orch, _clock) = orchestrator(&primary, &[], options());

    let err = orch
        .list(&SessionFilter::all().paginate(0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)));
    assert_eq!(primary.calls.total(), 0);
}

#[tokio::test]
async fn test_exists_cache_hit_skips_backends() {
    let primary = StubProvider::new("primary");
    let (orch, _clock) = orchestrator(&primary, &[], options());
    orch.save(&session("a", &[], 1)).await.expect("save");

    assert!(orch.exists("a").await.expect("exists"));
    assert_eq!(StubProvider::count(&primary.calls.exists), 0);
}

#[tokio::test]
async fn test_exists_checks_secondaries_and_swallows_failures() {
    let primary = StubProvider::failing("primary");
    let secondary = StubProvider::new("secondary");
    secondary.seed(session("a", &[], 1));
    let (orch, _clock) = orchestrator(&primary, &[&secondary], options());

    assert!(orch.exists("a").await.expect("exists"));
    assert!(!orch.exists("b").await.expect("exists"));

    let (all_down, _clock) = orchestrator(&StubProvider::failing("p"), &[], options());
    assert!(!all_down.exists("a").await.expect("exists never errors"));
}

#[tokio::test]
async fn test_orchestrator_nests_as_a_provider() {
    let inner_primary = StubProvider::new("inner");
    let (inner, _clock) = orchestrator(&inner_primary, &[], options());
    let outer = StorageOrchestrator::new(Arc::new(inner), Vec::new(), options());

    outer.save(&session("a", &[], 1)).await.expect("save");
    assert!(inner_primary.get("a").is_some());
    assert_eq!(outer.primary().name(), "orchestrator");
}

//! Provider factory.
//!
//! Turns a [`ProviderConfig`] into a ready [`SharedProvider`], recursing into
//! orchestrator configs, and composes orchestrators from a mix of configs and
//! already-built provider instances.

use std::sync::Arc;

use futures::future::BoxFuture;
use psp_core::{
    EdgeProvider, LocalFsProvider, ManagedProvider, MetadataIndex, ObjectStorageProvider,
    SharedProvider, StorageOrchestrator, StorageProvider,
};
use psp_db::SessionIndexRepository;
use psp_shared::{
    ManagedConfig, OrchestratorConfig, OrchestratorOptions, ProviderConfig, StorageResult,
};
use tracing::{info, warn};

/// Either a provider description or an existing provider.
#[derive(Clone)]
pub enum ProviderSource {
    /// Built through [`create_provider`].
    Config(ProviderConfig),
    /// Used as-is.
    Instance(SharedProvider),
}

impl std::fmt::Debug for ProviderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(config) => f.debug_tuple("Config").field(config).finish(),
            Self::Instance(provider) => f.debug_tuple("Instance").field(&provider.name()).finish(),
        }
    }
}

impl From<ProviderConfig> for ProviderSource {
    fn from(config: ProviderConfig) -> Self {
        Self::Config(config)
    }
}

impl From<SharedProvider> for ProviderSource {
    fn from(provider: SharedProvider) -> Self {
        Self::Instance(provider)
    }
}

impl ProviderSource {
    async fn resolve(self) -> StorageResult<SharedProvider> {
        match self {
            Self::Config(config) => create_provider(&config).await,
            Self::Instance(provider) => Ok(provider),
        }
    }
}

/// Builds the provider described by `config`.
///
/// The whole tree is validated before anything is constructed, so a bad
/// secondary deep inside an orchestrator fails fast without side effects.
///
/// # Errors
///
/// Returns [`psp_shared::StorageError::Validation`] for missing fields, or
/// the backend's error if it cannot be constructed.
pub fn create_provider(config: &ProviderConfig) -> BoxFuture<'_, StorageResult<SharedProvider>> {
    Box::pin(async move {
        config.validate()?;
        build(config).await
    })
}

fn build(config: &ProviderConfig) -> BoxFuture<'_, StorageResult<SharedProvider>> {
    Box::pin(async move {
        let provider: SharedProvider = match config {
            ProviderConfig::Local { path } => Arc::new(LocalFsProvider::new(path.clone())?),
            ProviderConfig::S3(s3) => Arc::new(ObjectStorageProvider::from_config(s3)?),
            ProviderConfig::Edge(edge) => Arc::new(EdgeProvider::new(edge)?),
            ProviderConfig::Managed(managed) => Arc::new(build_managed(managed).await?),
            ProviderConfig::Orchestrator(orch) => Arc::new(build_orchestrator(orch).await?),
        };
        info!(kind = config.kind(), provider = provider.name(), "Storage provider ready");
        Ok(provider)
    })
}

async fn build_managed(config: &ManagedConfig) -> StorageResult<ManagedProvider> {
    let Some(url) = &config.database_url else {
        return ManagedProvider::from_config(config, None);
    };

    let index = match psp_db::connect(url).await {
        Ok(db) => {
            let repo = SessionIndexRepository::new(db, &config.table_prefix)?;
            info!(table = repo.table(), "Metadata index connected");
            Some(Arc::new(repo) as Arc<dyn MetadataIndex>)
        }
        Err(e) => {
            warn!(error = %e, "Metadata index unreachable, listing will enumerate storage");
            None
        }
    };
    ManagedProvider::from_config(config, index)
}

async fn build_orchestrator(config: &OrchestratorConfig) -> StorageResult<StorageOrchestrator> {
    let primary = build(&config.primary).await?;
    let mut secondaries = Vec::with_capacity(config.secondaries.len());
    for secondary in &config.secondaries {
        secondaries.push(build(secondary).await?);
    }
    Ok(StorageOrchestrator::new(primary, secondaries, config.options()))
}

/// Composes an orchestrator from configs and/or existing providers.
///
/// # Errors
///
/// Returns the first error from resolving a source.
pub async fn create_orchestrator(
    primary: impl Into<ProviderSource>,
    secondaries: Vec<ProviderSource>,
    options: OrchestratorOptions,
) -> StorageResult<StorageOrchestrator> {
    let primary = primary.into().resolve().await?;
    let mut resolved = Vec::with_capacity(secondaries.len());
    for source in secondaries {
        resolved.push(source.resolve().await?);
    }
    info!(
        primary = primary.name(),
        secondaries = resolved.len(),
        "Orchestrator composed"
    );
    Ok(StorageOrchestrator::new(primary, resolved, options))
}

/// Builds an orchestrator with its concrete type, for callers that need
/// [`StorageOrchestrator::sync_all`] or [`StorageOrchestrator::drain`].
///
/// # Errors
///
/// Returns a validation error for an invalid tree, or the first backend
/// construction error.
pub async fn create_orchestrator_from_config(
    config: &OrchestratorConfig,
) -> StorageResult<StorageOrchestrator> {
    ProviderConfig::Orchestrator(config.clone()).validate()?;
    build_orchestrator(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use psp_shared::{
        BrowserSessionState, EdgeConfig, EdgeMode, S3Config, SessionMetadata, StorageError,
        StoredSession,
    };
    use rstest::rstest;
    use std::path::Path;

    fn local(path: &Path) -> ProviderConfig {
        ProviderConfig::Local {
            path: path.to_path_buf(),
        }
    }

    fn s3() -> ProviderConfig {
        ProviderConfig::S3(S3Config {
            region: "auto".into(),
            bucket: "sessions".into(),
            prefix: "psp/".into(),
            endpoint: Some("http://127.0.0.1:9".into()),
            force_path_style: true,
            access_key_id: None,
            secret_access_key: None,
        })
    }

    fn edge_kv(namespace_id: Option<&str>) -> ProviderConfig {
        ProviderConfig::Edge(EdgeConfig {
            mode: EdgeMode::Kv,
            account_id: "acct".into(),
            namespace_id: namespace_id.map(str::to_string),
            api_token: "token".into(),
            container: None,
            endpoint: None,
            api_base: None,
        })
    }

    fn managed(database_url: Option<&str>) -> ProviderConfig {
        ProviderConfig::Managed(ManagedConfig {
            project_url: "https://project.supabase.test".into(),
            api_key: "service-key".into(),
            bucket: "sessions".into(),
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            table_prefix: "psp_".into(),
            database_url: database_url.map(str::to_string),
        })
    }

    fn orchestrator(
        primary: ProviderConfig,
        secondaries: Vec<ProviderConfig>,
    ) -> OrchestratorConfig {
        let options = OrchestratorOptions::default();
        OrchestratorConfig {
            primary: Box::new(primary),
            secondaries,
            use_cache: options.use_cache,
            cache_ttl: options.cache_ttl_secs,
            cache_capacity: options.cache_capacity,
            replicate: options.replicate,
            strict_consistency: options.strict_consistency,
        }
    }

    fn session(id: &str) -> StoredSession {
        let mut meta = SessionMetadata::new("factory");
        meta.id = id.to_string();
        StoredSession::new(meta, BrowserSessionState::new())
    }

    #[rstest]
    #[case::s3(s3(), "s3")]
    #[case::edge(edge_kv(Some("ns")), "edge-kv")]
    #[case::managed(managed(None), "managed")]
    #[tokio::test]
    async fn test_builds_each_backend(#[case] config: ProviderConfig, #[case] name: &str) {
        let provider = create_provider(&config).await.expect("provider");
        assert_eq!(provider.name(), name);
    }

    #[tokio::test]
    async fn test_local_provider_is_usable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = create_provider(&local(dir.path())).await.expect("provider");

        provider.save(&session("s1")).await.expect("save");
        assert!(provider.exists("s1").await.expect("exists"));
        assert_eq!(provider.name(), "local");
    }

    #[tokio::test]
    async fn test_missing_field_is_validation_error() {
        let err = create_provider(&edge_kv(None)).await.err().expect("expected error");
        assert!(matches!(err, StorageError::Validation(msg) if msg.contains("namespace_id")));
    }

    #[tokio::test]
    async fn test_invalid_nested_secondary_fails_before_building() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("never-created");
        let config = ProviderConfig::Orchestrator(orchestrator(
            local(&root),
            vec![s3(), edge_kv(None)],
        ));

        let err = create_provider(&config).await.err().expect("expected error");
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_nested_orchestrator_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inner = orchestrator(local(&dir.path().join("inner")), vec![]);
        let config = ProviderConfig::Orchestrator(orchestrator(
            ProviderConfig::Orchestrator(inner),
            vec![local(&dir.path().join("mirror"))],
        ));

        let provider = create_provider(&config).await.expect("provider");
        provider.save(&session("nested")).await.expect("save");
        assert_eq!(provider.load("nested").await.expect("load").id(), "nested");
    }

    #[tokio::test]
    async fn test_unreachable_index_degrades_to_enumeration() {
        let provider = create_provider(&managed(Some("not-a-database-url")))
            .await
            .expect("managed provider without index");
        assert_eq!(provider.name(), "managed");
    }

    #[tokio::test]
    async fn test_orchestrator_mixes_instances_and_configs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let existing: SharedProvider =
            Arc::new(LocalFsProvider::new(dir.path().join("primary")).expect("local"));

        let orch = create_orchestrator(
            Arc::clone(&existing),
            vec![local(&dir.path().join("secondary")).into()],
            OrchestratorOptions::default().with_strict_consistency(true),
        )
        .await
        .expect("orchestrator");

        orch.save(&session("mixed")).await.expect("save");
        assert!(existing.exists("mixed").await.expect("exists"));
        assert!(orch.secondaries()[0].exists("mixed").await.expect("exists"));
    }

    #[tokio::test]
    async fn test_orchestrator_from_config_exposes_sync() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = orchestrator(
            local(&dir.path().join("a")),
            vec![local(&dir.path().join("b"))],
        );

        let orch = create_orchestrator_from_config(&config)
            .await
            .expect("orchestrator");
        orch.secondaries()[0]
            .save(&session("only-in-b"))
            .await
            .expect("seed");

        let report = orch.sync_all().await.expect("sync");
        assert_eq!(report.pulled, 1);
        assert!(orch.primary().exists("only-in-b").await.expect("exists"));
    }

    #[tokio::test]
    async fn test_zero_capacity_cache_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = orchestrator(local(dir.path()), vec![]);
        config.cache_capacity = 0;

        let err = create_orchestrator_from_config(&config).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }
}

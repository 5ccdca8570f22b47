//! Declarative storage configuration.
//!
//! [`ProviderConfig`] is the tagged union consumed by the provider factory.
//! [`AppConfig`] wraps it together with logging settings and knows how to
//! load itself from layered config files and `PSP__*` environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Default prefix for the managed backend's metadata table.
pub const DEFAULT_TABLE_PREFIX: &str = "psp_";

/// Default region of the managed backend's storage.
pub const DEFAULT_MANAGED_REGION: &str = "us-east-1";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage provider to build at startup.
    pub storage: ProviderConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "psp=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Storage provider configuration, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Local filesystem.
    Local {
        /// Base directory for session files.
        path: PathBuf,
    },
    /// S3-compatible object storage.
    S3(S3Config),
    /// Edge key-value / object / actor storage.
    Edge(EdgeConfig),
    /// Managed object storage plus a Postgres metadata table.
    Managed(ManagedConfig),
    /// Primary plus secondaries behind a caching, replicating orchestrator.
    Orchestrator(OrchestratorConfig),
}

/// S3-compatible object storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket region.
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Key prefix prepended to `<id>.json`.
    #[serde(default)]
    pub prefix: String,
    /// Endpoint override (MinIO, R2, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Address the bucket in the path instead of the host name.
    #[serde(default)]
    pub force_path_style: bool,
    /// Access key id. Falls back to the ambient credential chain when unset.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

/// Addressing mode of the edge provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMode {
    /// Key-value namespace: fast, small payloads.
    Kv,
    /// Bucket-style object storage: large payloads.
    Object,
    /// Actor namespace with single-object transactional semantics.
    Actor,
}

impl EdgeMode {
    /// Mode label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kv => "kv",
            Self::Object => "object",
            Self::Actor => "actor",
        }
    }
}

/// Edge storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Addressing mode.
    pub mode: EdgeMode,
    /// Account identifier.
    pub account_id: String,
    /// KV namespace id (`kv`) or actor namespace name (`actor`).
    #[serde(default)]
    pub namespace_id: Option<String>,
    /// Bearer token for the edge API.
    pub api_token: String,
    /// Bucket name (`object`).
    #[serde(default)]
    pub container: Option<String>,
    /// Worker endpoint fronting the actor namespace (`actor`).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// REST API base URL override.
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Managed backend settings.
///
/// Blobs go through the platform's S3-compatible storage endpoint
/// (`{project_url}/storage/v1/s3`). Without explicit S3 access keys the
/// project ref and `api_key` are used as session-token credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedConfig {
    /// Project URL of the managed platform.
    pub project_url: String,
    /// Service API key.
    pub api_key: String,
    /// Storage bucket for session blobs.
    pub bucket: String,
    /// Region of the project's storage.
    #[serde(default = "default_managed_region")]
    pub region: String,
    /// S3 access key id issued by the platform.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// S3 secret access key issued by the platform.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Prefix for the metadata table name.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    /// Postgres connection URL for the metadata table. Without it, metadata
    /// mirroring is disabled and `list` always enumerates storage.
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}

fn default_managed_region() -> String {
    DEFAULT_MANAGED_REGION.to_string()
}

/// Whether `prefix` can start a SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`,
/// or empty.
#[must_use]
pub fn is_valid_table_prefix(prefix: &str) -> bool {
    prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && prefix.chars().next().is_none_or(|c| !c.is_ascii_digit())
}

/// Orchestrator composition and behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Source-of-truth provider.
    pub primary: Box<ProviderConfig>,
    /// Replicas and fallbacks, tried in order.
    #[serde(default)]
    pub secondaries: Vec<ProviderConfig>,
    /// Enable the read-through cache.
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Cache entry lifetime in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Maximum number of cached sessions.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Write to secondaries on save/delete.
    #[serde(default = "default_true")]
    pub replicate: bool,
    /// Await secondary writes and fail on the first error.
    #[serde(default)]
    pub strict_consistency: bool,
}

impl OrchestratorConfig {
    /// Extracts the behavioral options.
    #[must_use]
    pub const fn options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            use_cache: self.use_cache,
            cache_ttl_secs: self.cache_ttl,
            cache_capacity: self.cache_capacity,
            replicate: self.replicate,
            strict_consistency: self.strict_consistency,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_cache_ttl() -> u64 {
    OrchestratorOptions::DEFAULT_CACHE_TTL_SECS
}

const fn default_cache_capacity() -> usize {
    OrchestratorOptions::DEFAULT_CACHE_CAPACITY
}

/// Orchestrator behavior independent of which providers it composes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Enable the read-through cache.
    pub use_cache: bool,
    /// Cache entry lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum number of cached sessions.
    pub cache_capacity: usize,
    /// Write to secondaries on save/delete.
    pub replicate: bool,
    /// Await secondary writes and fail on the first error.
    pub strict_consistency: bool,
}

impl OrchestratorOptions {
    /// Default cache TTL: 5 minutes.
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
    /// Default cache capacity: 100 sessions.
    pub const DEFAULT_CACHE_CAPACITY: usize = 100;

    /// Set cache usage.
    #[must_use]
    pub const fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Set cache TTL.
    #[must_use]
    pub const fn with_cache_ttl(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    /// Set cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set replication.
    #[must_use]
    pub const fn with_replication(mut self, enabled: bool) -> Self {
        self.replicate = enabled;
        self
    }

    /// Set strict consistency.
    #[must_use]
    pub const fn with_strict_consistency(mut self, strict: bool) -> Self {
        self.strict_consistency = strict;
        self
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_ttl_secs: Self::DEFAULT_CACHE_TTL_SECS,
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
            replicate: true,
            strict_consistency: false,
        }
    }
}

fn require(value: &str, field: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn require_some(value: Option<&String>, field: &str) -> StorageResult<()> {
    require(value.map_or("", String::as_str), field)
}

impl ProviderConfig {
    /// Provider type label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::S3(_) => "s3",
            Self::Edge(_) => "edge",
            Self::Managed(_) => "managed",
            Self::Orchestrator(_) => "orchestrator",
        }
    }

    /// Checks that every field required by the selected type is present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] naming the first missing or
    /// malformed field.
    pub fn validate(&self) -> StorageResult<()> {
        match self {
            Self::Local { path } => {
                if path.as_os_str().is_empty() {
                    return Err(StorageError::validation("local.path is required"));
                }
                Ok(())
            }
            Self::S3(s3) => {
                require(&s3.region, "s3.region")?;
                require(&s3.bucket, "s3.bucket")?;
                if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                    return Err(StorageError::validation(
                        "s3.access_key_id and s3.secret_access_key must be set together",
                    ));
                }
                Ok(())
            }
            Self::Edge(edge) => {
                require(&edge.account_id, "edge.account_id")?;
                require(&edge.api_token, "edge.api_token")?;
                match edge.mode {
                    EdgeMode::Kv => require_some(edge.namespace_id.as_ref(), "edge.namespace_id"),
                    EdgeMode::Object => require_some(edge.container.as_ref(), "edge.container"),
                    EdgeMode::Actor => {
                        require_some(edge.namespace_id.as_ref(), "edge.namespace_id")?;
                        require_some(edge.endpoint.as_ref(), "edge.endpoint")
                    }
                }
            }
            Self::Managed(managed) => {
                require(&managed.project_url, "managed.project_url")?;
                require(&managed.api_key, "managed.api_key")?;
                require(&managed.bucket, "managed.bucket")?;
                require(&managed.region, "managed.region")?;
                if managed.access_key_id.is_some() != managed.secret_access_key.is_some() {
                    return Err(StorageError::validation(
                        "managed.access_key_id requires managed.secret_access_key and vice versa",
                    ));
                }
                if !is_valid_table_prefix(&managed.table_prefix) {
                    return Err(StorageError::validation(format!(
                        "managed.table_prefix '{}' must be [A-Za-z_][A-Za-z0-9_]*",
                        managed.table_prefix
                    )));
                }
                Ok(())
            }
            Self::Orchestrator(orch) => {
                if orch.use_cache && orch.cache_capacity == 0 {
                    return Err(StorageError::validation(
                        "orchestrator.cache_capacity must be greater than zero",
                    ));
                }
                orch.primary.validate()?;
                orch.secondaries.iter().try_for_each(Self::validate)
            }
        }
    }
}

impl AppConfig {
    /// Loads configuration from config files and environment.
    ///
    /// Sources, later overriding earlier: `config/default`, `config/{RUN_MODE}`,
    /// then `PSP__*` variables (`PSP__STORAGE__TYPE=local`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("PSP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

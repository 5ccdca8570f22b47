//! Shared types, errors, and configuration for PSP session storage.
//!
//! This crate provides the pieces every other crate agrees on:
//! - Session record types (`StoredSession` and its parts)
//! - `SessionFilter` with uniform in-memory filter/sort/paginate semantics
//! - The `StorageError` taxonomy
//! - Declarative provider configuration and its loader

pub mod config;
pub mod error;
pub mod filter;
pub mod model;

pub use config::{
    AppConfig, EdgeConfig, EdgeMode, LoggingConfig, ManagedConfig, OrchestratorConfig,
    OrchestratorOptions, ProviderConfig, S3Config,
};
pub use error::{StorageError, StorageResult};
pub use filter::{DateRange, SessionFilter};
pub use model::{
    BrowserSessionState, CacheEntry, Cookie, HistoryEntry, NavigationState, OriginStorage,
    SameSite, SessionMetadata, StorageEntries, StorageSnapshot, StoredSession, Viewport,
};

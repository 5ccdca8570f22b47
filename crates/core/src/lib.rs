//! Storage providers and orchestration for PSP browser sessions.
//!
//! This crate has ZERO database dependencies. The managed backend's
//! relational metadata mirror is the [`MetadataIndex`] trait, implemented by
//! the db crate.
//!
//! # Modules
//!
//! - `provider` - The [`StorageProvider`] contract
//! - `codec` - Session <-> JSON document conversion shared by all backends
//! - `storage` - OpenDAL operators and the blob store used by file/object backends
//! - `backends` - Local filesystem, S3, edge and managed providers
//! - `orchestrator` - Cache, replication, fallback reads and reconciliation
//! - `index` - Metadata index trait for filter pushdown

pub mod backends;
pub mod codec;
pub mod index;
pub mod orchestrator;
pub mod provider;
pub mod storage;

pub use backends::{EdgeProvider, LocalFsProvider, ManagedProvider, ObjectStorageProvider};
pub use index::MetadataIndex;
pub use orchestrator::{Clock, ManualClock, StorageOrchestrator, SyncReport, SystemClock};
pub use provider::{SharedProvider, StorageProvider, check_id};

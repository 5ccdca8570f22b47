//! Storage provider implementations, one per backend.

pub mod edge;
pub mod local;
pub mod managed;
pub mod object;

pub use edge::EdgeProvider;
pub use local::LocalFsProvider;
pub use managed::ManagedProvider;
pub use object::ObjectStorageProvider;

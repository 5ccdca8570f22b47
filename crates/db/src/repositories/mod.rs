//! Repository implementations for database operations.

mod session_index;

pub use session_index::SessionIndexRepository;

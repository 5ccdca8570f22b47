//! Database layer for the managed backend's metadata index.
//!
//! This crate provides:
//! - The `<prefix>sessions` table schema
//! - [`SessionIndexRepository`], the Postgres implementation of
//!   [`psp_core::MetadataIndex`]
//! - Database migrations

pub mod migration;
pub mod repositories;
pub mod schema;

pub use repositories::SessionIndexRepository;

use sea_orm::{Database, DatabaseConnection, DbErr};

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

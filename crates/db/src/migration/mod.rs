//! Database migrations.
//!
//! Migrations are managed using sea-orm-migration. They provision the
//! metadata table under the default prefix; tables for other prefixes are
//! created with [`crate::SessionIndexRepository::ensure_schema`].

pub use sea_orm_migration::prelude::*;

mod m20260301_000001_session_metadata;

/// Migrator for running database migrations.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260301_000001_session_metadata::Migration)]
    }
}

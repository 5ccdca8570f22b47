//! Migration runner for the managed backend's metadata table.
//!
//! Usage (connection from `DATABASE_URL`):
//!   psp-migrator up      - Create `psp_sessions` and its indexes
//!   psp-migrator down    - Drop it again
//!   psp-migrator status  - Show migration status
//!
//! Tables under a custom `table_prefix` are created on demand by
//! `SessionIndexRepository::ensure_schema`.

use psp_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // The migrator CLI installs its own tracing subscriber.
    cli::run_cli(Migrator).await;
}

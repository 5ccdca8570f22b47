//! DDL for the session metadata table.
//!
//! The table name is `<table_prefix>sessions`. Since it is spliced into SQL
//! text, the prefix is restricted to ASCII letters, digits and underscores.

use psp_shared::config::is_valid_table_prefix;
use psp_shared::{StorageError, StorageResult};

/// Builds and validates the metadata table name for `prefix`.
///
/// # Errors
///
/// Returns a validation error if the prefix contains anything other than
/// ASCII alphanumerics and underscores, or starts with a digit.
pub fn table_name(prefix: &str) -> StorageResult<String> {
    if !is_valid_table_prefix(prefix) {
        return Err(StorageError::validation(format!(
            "table prefix '{prefix}' must be [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(format!("{prefix}sessions"))
}

/// `CREATE TABLE IF NOT EXISTS` plus indexes for `table`.
#[must_use]
pub fn create_table_sql(table: &str) -> String {
    format!(
        r"
-- Denormalized session metadata for filter pushdown
CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    tags JSONB NOT NULL DEFAULT '[]'::jsonb,
    adapter TEXT,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

-- Default listing order
CREATE INDEX IF NOT EXISTS idx_{table}_updated ON {table} (updated_at DESC, id);

-- Tag containment (tags @> '[...]')
CREATE INDEX IF NOT EXISTS idx_{table}_tags ON {table} USING GIN (tags);
"
    )
}

/// `DROP TABLE IF EXISTS` for `table`.
#[must_use]
pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table} CASCADE;")
}

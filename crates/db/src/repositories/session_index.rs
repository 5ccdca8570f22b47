//! Session metadata index repository.
//!
//! Implements [`MetadataIndex`] over the `<prefix>sessions` table with raw
//! SQL so the table name can follow the configured prefix.

use async_trait::async_trait;
use psp_core::MetadataIndex;
use psp_shared::{SessionFilter, SessionMetadata, StorageError, StorageResult};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, FromQueryResult, Statement, Value,
};
use tracing::debug;

use crate::schema;

const BACKEND: &str = "managed-index";

/// Postgres-backed metadata index.
#[derive(Debug, Clone)]
pub struct SessionIndexRepository {
    db: DatabaseConnection,
    table: String,
}

#[derive(Debug, FromQueryResult)]
struct SessionRow {
    id: String,
    name: String,
    description: Option<String>,
    tags: serde_json::Value,
    adapter: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SessionRow> for SessionMetadata {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let tags: Vec<String> = serde_json::from_value(row.tags).map_err(|e| {
            StorageError::serialization(format!("tags column of session '{}': {e}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            tags,
            adapter: row.adapter,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl SessionIndexRepository {
    /// Create a new repository for `<table_prefix>sessions`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unsafe table prefix.
    pub fn new(db: DatabaseConnection, table_prefix: &str) -> StorageResult<Self> {
        Ok(Self {
            db,
            table: schema::table_name(table_prefix)?,
        })
    }

    /// Fully resolved table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the table and its indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        self.db
            .execute_unprepared(&schema::create_table_sql(&self.table))
            .await
            .map_err(db_error)?;
        Ok(())
    }

    fn statement(sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
    }
}

#[async_trait]
impl MetadataIndex for SessionIndexRepository {
    async fn upsert(&self, metadata: &SessionMetadata) -> StorageResult<()> {
        let sql = format!(
            "INSERT INTO {t} (id, name, description, tags, adapter, created_at, updated_at) \
             VALUES ($1, $2, $3, $4::jsonb, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, description = EXCLUDED.description, tags = EXCLUDED.tags, \
             adapter = EXCLUDED.adapter, created_at = EXCLUDED.created_at, \
             updated_at = EXCLUDED.updated_at",
            t = self.table
        );
        let values = vec![
            metadata.id.clone().into(),
            metadata.name.clone().into(),
            metadata.description.clone().into(),
            serde_json::to_value(&metadata.tags)?.into(),
            metadata.adapter.clone().into(),
            metadata.created_at.into(),
            metadata.updated_at.into(),
        ];

        self.db
            .execute(Self::statement(sql, values))
            .await
            .map_err(db_error)?;
        debug!(table = %self.table, session_id = %metadata.id, "Upserted metadata row");
        Ok(())
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        self.db
            .execute(Self::statement(sql, vec![id.into()]))
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn query(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>> {
        filter.validate()?;
        let (sql, values) = build_query(&self.table, filter)?;
        let rows = SessionRow::find_by_statement(Self::statement(sql, values))
            .all(&self.db)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(SessionMetadata::try_from).collect()
    }
}

fn db_error(err: DbErr) -> StorageError {
    StorageError::unavailable(BACKEND, err.to_string())
}

/// Positional bind parameter collector.
#[derive(Debug, Default)]
struct Binds {
    values: Vec<Value>,
}

impl Binds {
    fn push(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }
}

/// Escapes `%`, `_` and `\` for a `LIKE` pattern.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Translates `filter` into SQL over `table`.
///
/// Matches [`SessionFilter::apply`]: predicates, then `updated_at` desc with
/// id as tie-break (byte order), then offset and limit.
pub(crate) fn build_query(
    table: &str,
    filter: &SessionFilter,
) -> StorageResult<(String, Vec<Value>)> {
    let mut binds = Binds::default();
    let mut clauses = Vec::new();

    if let Some(name) = &filter.name {
        let p = binds.push(format!("%{}%", escape_like(name)));
        clauses.push(format!("name ILIKE {p} ESCAPE '\\'"));
    }
    if let Some(tags) = &filter.tags
        && !tags.is_empty()
    {
        let p = binds.push(serde_json::to_value(tags)?);
        clauses.push(format!("tags @> {p}::jsonb"));
    }
    for (column, range) in [("created_at", filter.created), ("updated_at", filter.updated)] {
        let Some(range) = range else { continue };
        if let Some(from) = range.from {
            let p = binds.push(from);
            clauses.push(format!("{column} >= {p}"));
        }
        if let Some(to) = range.to {
            let p = binds.push(to);
            clauses.push(format!("{column} <= {p}"));
        }
    }

    let mut sql = format!(
        "SELECT id, name, description, tags, adapter, created_at, updated_at FROM {table}"
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY updated_at DESC, id COLLATE \"C\" ASC");

    if let Some(limit) = filter.limit {
        let p = binds.push(to_i64(limit, "limit")?);
        sql.push_str(&format!(" LIMIT {p}"));
    }
    if let Some(offset) = filter.offset
        && offset > 0
    {
        let p = binds.push(to_i64(offset, "offset")?);
        sql.push_str(&format!(" OFFSET {p}"));
    }

    Ok((sql, binds.values))
}

fn to_i64(value: usize, field: &str) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::validation(format!("{field} {value} is out of range")))
}

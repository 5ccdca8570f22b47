//! Session metadata table for the managed backend.
//!
//! Creates `psp_sessions`, the denormalized mirror of each stored session's
//! metadata used for filter pushdown.

use psp_shared::config::DEFAULT_TABLE_PREFIX;
use sea_orm_migration::prelude::*;

use crate::schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn table() -> Result<String, DbErr> {
    schema::table_name(DEFAULT_TABLE_PREFIX).map_err(|e| DbErr::Custom(e.to_string()))
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(&schema::create_table_sql(&table()?))
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(&schema::drop_table_sql(&table()?))
            .await?;
        Ok(())
    }
}

//! Database access for kinload-import
//!
//! Entity tables for the SQLite store and the checkpoint repository backed
//! by the shared `import_sessions` table.

pub mod schema;
pub mod sessions;

pub use sessions::{SessionRepository, SessionSummary};

use kinload_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open the destination database with every table the importer needs
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = kinload_common::db::init_database(db_path).await?;
    schema::create_entity_tables(&pool).await?;
    Ok(pool)
}

//! Database initialization
//!
//! Opens (creating if necessary) the destination SQLite database and creates
//! the tables every kinload process relies on. Entity tables are owned by the
//! import crate.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create shared tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Imports write sequentially; a small pool is enough
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool, true).await?;
    create_import_sessions_table(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database (tests and dry runs)
///
/// A single connection is used so every query sees the same database.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool, false).await?;
    create_import_sessions_table(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool, wal: bool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL lets a status query read while an import batch writes
    if wal {
        sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    }

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

/// Create the import session table holding caller-persisted checkpoints
pub async fn create_import_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_sessions (
            session_id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            state TEXT NOT NULL,
            checkpoint BLOB NOT NULL,
            started_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_sessions_collection ON import_sessions(collection)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

//! Destination tables
//!
//! One table per entity kind plus `links` and `events`. Tables are created with
//! `IF NOT EXISTS`; their column lists come from [`EntityKind::columns`].
//!
//! Every entity table carries its origin (`import_session_id`,
//! `source_offset`) under a UNIQUE constraint, which is what makes a
//! replayed commit return the existing row instead of inserting twice.

use crate::models::EntityKind;
use kinload_common::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// DDL for one entity table
pub fn entity_table_ddl(kind: EntityKind) -> String {
    let mut columns = String::new();
    for column in kind.columns() {
        columns.push_str(&format!(
            "            {} {},\n",
            column.name,
            column.column_type.sql()
        ));
    }

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            xref TEXT,
            import_session_id TEXT NOT NULL,
            source_offset INTEGER NOT NULL,
{columns}            UNIQUE (import_session_id, source_offset)
        )
        "#,
        table = kind.table_name(),
        columns = columns,
    )
}

/// Create every entity table and the link table
pub async fn create_entity_tables(pool: &SqlitePool) -> Result<()> {
    for kind in EntityKind::ALL {
        sqlx::query(&entity_table_ddl(kind)).execute(pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_collection_xref ON {table}(collection, xref)",
            table = kind.table_name()
        );
        sqlx::query(&index).execute(pool).await?;
        debug!(table = kind.table_name(), "Entity table ready");
    }

    create_links_table(pool).await?;
    create_events_table(pool).await
}

/// Pointer rows; `to_id` stays NULL for references that never resolved
pub async fn create_links_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS links (
            collection TEXT NOT NULL,
            from_kind TEXT NOT NULL,
            from_id INTEGER NOT NULL,
            role TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            target_xref TEXT NOT NULL,
            target_kind TEXT,
            to_id INTEGER,
            PRIMARY KEY (collection, from_kind, from_id, role, sequence)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_target ON links(collection, to_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Dated or placed substructures, one row per `DATE` (or per `PLAC` when undated)
pub async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            collection TEXT NOT NULL,
            owner_kind TEXT NOT NULL,
            owner_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            event_date TEXT,
            event_date_jd INTEGER,
            place TEXT,
            PRIMARY KEY (collection, owner_kind, owner_id, tag, sequence)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_date ON events(collection, event_date_jd)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_includes_kind_columns() {
        let ddl = entity_table_ddl(EntityKind::Individual);
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS individuals"));
        assert!(ddl.contains("birth_date_jd INTEGER"));
        assert!(ddl.contains("surname TEXT"));
        assert!(ddl.contains("UNIQUE (import_session_id, source_offset)"));
    }

    #[tokio::test]
    async fn test_tables_created_twice_without_error() {
        let pool = kinload_common::db::open_in_memory().await.unwrap();
        create_entity_tables(&pool).await.unwrap();
        create_entity_tables(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for kind in EntityKind::ALL {
            assert!(tables.iter().any(|t| t == kind.table_name()));
        }
        assert!(tables.iter().any(|t| t == "links"));
        assert!(tables.iter().any(|t| t == "events"));
        assert!(tables.iter().any(|t| t == "import_sessions"));
    }
}

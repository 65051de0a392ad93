//! SQLite entity store
//!
//! Statements are assembled from the column whitelist of each entity kind,
//! so only known table and column names ever reach the SQL text; values are
//! always bound.

use super::{EntityHandle, EntityStore, EventRecord, FieldValue, LinkRecord, StorageId, StoreError};
use crate::db::schema;
use crate::models::EntityKind;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqlitePool};
use sqlx::query::Query;
use sqlx::Sqlite;
use tracing::debug;

/// Entity store writing to the destination SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the destination tables if needed and wrap the pool
    pub async fn initialize(pool: SqlitePool) -> kinload_common::Result<Self> {
        schema::create_entity_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of entities of one kind in a collection
    pub async fn count(&self, kind: EntityKind, scope: &str) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE collection = ?", kind.table_name());
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(scope)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(count as u64)
    }

    /// Text column of one entity
    pub async fn text_field(
        &self,
        kind: EntityKind,
        id: StorageId,
        column: &str,
    ) -> Result<Option<String>, StoreError> {
        if !kind.has_column(column) {
            return Err(StoreError::Rejected(format!("{} has no column {}", kind, column)));
        }
        let sql = format!("SELECT {} FROM {} WHERE id = ?", column, kind.table_name());
        let value: Option<Option<String>> = sqlx::query_scalar(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(value.flatten())
    }

    /// Links stored for a collection, ordered by referrer, role and sequence
    pub async fn links(&self, scope: &str) -> Result<Vec<LinkRecord>, StoreError> {
        let rows: Vec<(String, i64, String, i64, String, Option<String>, Option<i64>)> =
            sqlx::query_as(
                r#"
                SELECT from_kind, from_id, role, sequence, target_xref, target_kind, to_id
                FROM links
                WHERE collection = ?
                ORDER BY from_kind, from_id, role, sequence
                "#,
            )
            .bind(scope)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows.into_iter()
            .map(|(from_kind, from_id, role, sequence, target_xref, target_kind, to_id)| {
                Ok(LinkRecord {
                    from_kind: parse_kind(&from_kind)?,
                    from_id: StorageId(from_id),
                    role,
                    target_xref,
                    target_kind: target_kind.as_deref().map(parse_kind).transpose()?,
                    to_id: to_id.map(StorageId),
                    sequence: sequence as u32,
                })
            })
            .collect()
    }

    /// Events stored for a collection, ordered by owner, tag and sequence
    pub async fn events(&self, scope: &str) -> Result<Vec<EventRecord>, StoreError> {
        let rows: Vec<(String, i64, String, i64, Option<String>, Option<i64>, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT owner_kind, owner_id, tag, sequence, event_date, event_date_jd, place
                FROM events
                WHERE collection = ?
                ORDER BY owner_kind, owner_id, tag, sequence
                "#,
            )
            .bind(scope)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows.into_iter()
            .map(|(owner_kind, owner_id, tag, sequence, date, date_jd, place)| {
                Ok(EventRecord {
                    owner_kind: parse_kind(&owner_kind)?,
                    owner_id: StorageId(owner_id),
                    tag,
                    sequence: sequence as u32,
                    date,
                    date_jd,
                    place,
                })
            })
            .collect()
    }
}

fn parse_kind(name: &str) -> Result<EntityKind, StoreError> {
    EntityKind::ALL
        .into_iter()
        .find(|kind| kind.as_str() == name)
        .ok_or_else(|| StoreError::Rejected(format!("unknown entity kind {}", name)))
}

/// Sort a sqlx error into retry / record / fail
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            if message.contains("database is locked") || message.contains("busy") {
                StoreError::Transient(message)
            } else {
                StoreError::Rejected(message)
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Transient(err.to_string()),
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Rejected(err.to_string()),
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &FieldValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        FieldValue::Null => query.bind(None::<String>),
        FieldValue::Text(text) => query.bind(text.clone()),
        FieldValue::Integer(number) => query.bind(*number),
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn commit(&self, handle: &EntityHandle) -> Result<StorageId, StoreError> {
        let table = handle.kind.table_name();
        let fields = handle.effective_fields();
        let session_id = handle.origin.session_id.to_string();
        let source_offset = handle.origin.source_offset as i64;

        let mut tx = self.pool.begin().await.map_err(classify)?;

        if let Some(existing) = handle.existing {
            let mut assignments = vec!["import_session_id = ?", "source_offset = ?"]
                .into_iter()
                .map(str::to_owned)
                .collect::<Vec<_>>();
            assignments.extend(fields.iter().map(|(name, _)| format!("{} = ?", name)));
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ? AND collection = ?",
                table,
                assignments.join(", ")
            );

            let mut query = sqlx::query(&sql).bind(&session_id).bind(source_offset);
            for (_, value) in &fields {
                query = bind_value(query, value);
            }
            let result = query
                .bind(existing.0)
                .bind(&handle.scope)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Rejected(format!(
                    "no {} with id {} in {}",
                    handle.kind, existing, handle.scope
                )));
            }
            tx.commit().await.map_err(classify)?;
            debug!(kind = %handle.kind, id = existing.0, "Updated entity in place");
            return Ok(existing);
        }

        // A replayed origin returns the row written the first time
        let replay_sql = format!(
            "SELECT id FROM {} WHERE import_session_id = ? AND source_offset = ?",
            table
        );
        let replayed: Option<i64> = sqlx::query_scalar(&replay_sql)
            .bind(&session_id)
            .bind(source_offset)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;
        if let Some(id) = replayed {
            tx.commit().await.map_err(classify)?;
            debug!(kind = %handle.kind, id, "Origin already committed");
            return Ok(StorageId(id));
        }

        let mut columns = vec!["collection", "xref", "import_session_id", "source_offset"];
        columns.extend(fields.iter().map(|(name, _)| *name));
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(&handle.scope)
            .bind(handle.xref.as_deref())
            .bind(&session_id)
            .bind(source_offset);
        for (_, value) in &fields {
            query = bind_value(query, value);
        }
        let result = query.execute(&mut *tx).await.map_err(classify)?;
        tx.commit().await.map_err(classify)?;

        Ok(StorageId(result.last_insert_rowid()))
    }

    async fn find_by_xref(
        &self,
        kind: EntityKind,
        scope: &str,
        xref: &str,
    ) -> Result<Option<StorageId>, StoreError> {
        let sql = format!(
            "SELECT id FROM {} WHERE collection = ? AND xref = ? ORDER BY id LIMIT 1",
            kind.table_name()
        );
        let id: Option<i64> = sqlx::query_scalar(&sql)
            .bind(scope)
            .bind(xref)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(id.map(StorageId))
    }

    async fn write_link(&self, scope: &str, link: &LinkRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO links (
                collection, from_kind, from_id, role, sequence,
                target_xref, target_kind, to_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, from_kind, from_id, role, sequence) DO UPDATE SET
                target_xref = excluded.target_xref,
                target_kind = excluded.target_kind,
                to_id = excluded.to_id
            "#,
        )
        .bind(scope)
        .bind(link.from_kind.as_str())
        .bind(link.from_id.0)
        .bind(&link.role)
        .bind(i64::from(link.sequence))
        .bind(&link.target_xref)
        .bind(link.target_kind.map(EntityKind::as_str))
        .bind(link.to_id.map(|id| id.0))
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn write_event(&self, scope: &str, event: &EventRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO events (
                collection, owner_kind, owner_id, tag, sequence,
                event_date, event_date_jd, place
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, owner_kind, owner_id, tag, sequence) DO UPDATE SET
                event_date = excluded.event_date,
                event_date_jd = excluded.event_date_jd,
                place = excluded.place
            "#,
        )
        .bind(scope)
        .bind(event.owner_kind.as_str())
        .bind(event.owner_id.0)
        .bind(&event.tag)
        .bind(i64::from(event.sequence))
        .bind(event.date.as_deref())
        .bind(event.date_jd)
        .bind(event.place.as_deref())
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn clear_owned(
        &self,
        kind: EntityKind,
        scope: &str,
        id: StorageId,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let links = sqlx::query(
            "DELETE FROM links WHERE collection = ? AND from_kind = ? AND from_id = ?",
        )
        .bind(scope)
        .bind(kind.as_str())
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        let events = sqlx::query(
            "DELETE FROM events WHERE collection = ? AND owner_kind = ? AND owner_id = ?",
        )
        .bind(scope)
        .bind(kind.as_str())
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(links.rows_affected() + events.rows_affected())
    }

    async fn clear_collection(&self, kind: EntityKind, scope: &str) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        sqlx::query("DELETE FROM links WHERE collection = ? AND from_kind = ?")
            .bind(scope)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        sqlx::query("DELETE FROM events WHERE collection = ? AND owner_kind = ?")
            .bind(scope)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let sql = format!("DELETE FROM {} WHERE collection = ?", kind.table_name());
        let result = sqlx::query(&sql)
            .bind(scope)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(result.rows_affected())
    }
}

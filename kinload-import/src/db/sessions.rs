//! Import session persistence
//!
//! Checkpoints are stored as opaque blobs in `import_sessions`, one row per
//! session, replaced on every persist. The state and collection columns are
//! copied out of the blob so sessions can be listed without decoding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kinload_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::ImportState;
use crate::services::import_orchestrator::{Checkpoint, CheckpointSink};
use crate::store::sqlite::classify;
use crate::utils::{retry_transient, RetryPolicy};

/// Listing entry for a stored session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub collection: String,
    pub state: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Checkpoint storage in the destination database
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Save a checkpoint, replacing the session's previous one
    ///
    /// Uses retry_transient to ride out lock contention with a concurrent reader.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        // Prepare all data BEFORE acquiring database connection
        let session_id = checkpoint.session_id.to_string();
        let state = checkpoint.state.as_str();
        let now = Utc::now().to_rfc3339();

        retry_transient("save checkpoint", self.retry, || async {
            sqlx::query(
                r#"
                INSERT INTO import_sessions (
                    session_id, collection, state, checkpoint, started_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(session_id) DO UPDATE SET
                    state = excluded.state,
                    checkpoint = excluded.checkpoint,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&session_id)
            .bind(&checkpoint.collection)
            .bind(state)
            .bind(&checkpoint.blob)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("Failed to save checkpoint {}: {}", session_id, e)))
    }

    /// Load the latest checkpoint of a session
    ///
    /// A stored blob that fails verification is `CheckpointCorrupt`.
    pub async fn load(&self, session_id: Uuid) -> std::result::Result<Option<Checkpoint>, EngineError> {
        let blob: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT checkpoint FROM import_sessions WHERE session_id = ?")
                .bind(session_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;

        blob.map(Checkpoint::from_blob).transpose()
    }

    /// Sessions not yet in a terminal state, most recent first
    pub async fn list_active(&self) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, collection, state, started_at, updated_at
            FROM import_sessions
            WHERE state NOT IN (?, ?, ?)
            ORDER BY started_at DESC
            "#,
        )
        .bind(ImportState::Completed.as_str())
        .bind(ImportState::Failed.as_str())
        .bind(ImportState::Cancelled.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    /// Summary of one session
    pub async fn summary(&self, session_id: Uuid) -> Result<Option<SessionSummary>> {
        let row = sqlx::query(
            r#"
            SELECT session_id, collection, state, started_at, updated_at
            FROM import_sessions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(summary_from_row).transpose()
    }

    /// Delete a session row
    pub async fn delete(&self, session_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM import_sessions WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionSummary> {
    let session_id: String = row.get("session_id");
    let session_id = Uuid::parse_str(&session_id)
        .map_err(|e| Error::Internal(format!("Failed to parse session_id: {}", e)))?;

    let started_at: String = row.get("started_at");
    let updated_at: String = row.get("updated_at");

    Ok(SessionSummary {
        session_id,
        collection: row.get("collection"),
        state: row.get("state"),
        started_at: parse_timestamp(&started_at, "started_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

#[async_trait]
impl CheckpointSink for SessionRepository {
    async fn persist(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.save(checkpoint).await
    }

    async fn discard(&self, session_id: Uuid) -> Result<()> {
        self.delete(session_id).await
    }
}

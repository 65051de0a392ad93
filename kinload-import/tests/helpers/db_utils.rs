//! Database Test Utilities

use async_trait::async_trait;
use kinload_import::{Checkpoint, CheckpointSink, MemoryCheckpointSink};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;
use uuid::Uuid;

/// Create temporary on-disk database with every importer table
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> anyhow::Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_kinload.db");
    let pool = kinload_import::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Checkpoint sink that fails one chosen `persist` call
///
/// Stands in for a process dying right before a checkpoint becomes durable.
#[derive(Debug, Default)]
pub struct FlakySink {
    pub inner: MemoryCheckpointSink,
    /// 1-based persist call that fails (0: never)
    fail_on_call: AtomicU32,
    calls: AtomicU32,
}

impl FlakySink {
    pub fn failing_on(call: u32) -> Self {
        Self {
            inner: MemoryCheckpointSink::new(),
            fail_on_call: AtomicU32::new(call),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CheckpointSink for FlakySink {
    async fn persist(&self, checkpoint: &Checkpoint) -> kinload_common::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call.load(Ordering::SeqCst) {
            return Err(kinload_common::Error::Internal("simulated crash".to_string()));
        }
        self.inner.persist(checkpoint).await
    }

    async fn discard(&self, session_id: Uuid) -> kinload_common::Result<()> {
        self.inner.discard(session_id).await
    }
}

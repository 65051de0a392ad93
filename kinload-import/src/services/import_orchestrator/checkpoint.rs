//! Checkpoint codec and sinks
//!
//! A checkpoint is an opaque blob: a JSON envelope
//! `{format_version, payload_sha256, payload}` whose payload (itself JSON
//! text) carries the session state, the resolver tables and the digest of
//! the source the session reads. The envelope digest is checked on decode;
//! any mismatch or parse failure is reported as `CheckpointCorrupt`.

use crate::error::EngineError;
use crate::models::{ImportSession, ImportState};
use crate::xref::XrefResolver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Current blob layout
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Hex SHA-256 of a byte buffer
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    payload_sha256: String,
    payload: String,
}

/// Everything a resumed session needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub session: ImportSession,
    pub resolver: XrefResolver,
    /// Hex SHA-256 of the source bytes
    pub source_digest: String,
}

/// Durable snapshot of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub session_id: Uuid,
    pub collection: String,
    pub state: ImportState,
    /// Encoded envelope
    pub blob: Vec<u8>,
}

impl Checkpoint {
    /// Encode session and resolver state
    pub fn encode(payload: &CheckpointPayload) -> Result<Self, EngineError> {
        let payload_json = serde_json::to_string(payload).map_err(|e| {
            EngineError::CheckpointCorrupt(format!("Failed to serialize payload: {}", e))
        })?;
        let envelope = Envelope {
            format_version: CHECKPOINT_FORMAT_VERSION,
            payload_sha256: sha256_hex(payload_json.as_bytes()),
            payload: payload_json,
        };
        let blob = serde_json::to_vec(&envelope).map_err(|e| {
            EngineError::CheckpointCorrupt(format!("Failed to serialize envelope: {}", e))
        })?;

        Ok(Self {
            session_id: payload.session.session_id,
            collection: payload.session.collection.clone(),
            state: payload.session.state,
            blob,
        })
    }

    /// Rebuild a checkpoint from a stored blob
    pub fn from_blob(blob: Vec<u8>) -> Result<Self, EngineError> {
        let payload = decode_blob(&blob)?;
        Ok(Self {
            session_id: payload.session.session_id,
            collection: payload.session.collection,
            state: payload.session.state,
            blob,
        })
    }

    /// Verify and decode the payload
    pub fn decode(&self) -> Result<CheckpointPayload, EngineError> {
        decode_blob(&self.blob)
    }
}

fn decode_blob(blob: &[u8]) -> Result<CheckpointPayload, EngineError> {
    let envelope: Envelope = serde_json::from_slice(blob)
        .map_err(|e| EngineError::CheckpointCorrupt(format!("unreadable envelope: {}", e)))?;

    if envelope.format_version != CHECKPOINT_FORMAT_VERSION {
        return Err(EngineError::UnsupportedCheckpointVersion(envelope.format_version));
    }

    let digest = sha256_hex(envelope.payload.as_bytes());
    if digest != envelope.payload_sha256 {
        return Err(EngineError::CheckpointCorrupt(format!(
            "payload digest {} does not match recorded {}",
            digest, envelope.payload_sha256
        )));
    }

    serde_json::from_str(&envelope.payload)
        .map_err(|e| EngineError::CheckpointCorrupt(format!("unreadable payload: {}", e)))
}

/// Where checkpoints are made durable
///
/// `persist` replaces any earlier checkpoint of the same session.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn persist(&self, checkpoint: &Checkpoint) -> kinload_common::Result<()>;

    async fn discard(&self, session_id: Uuid) -> kinload_common::Result<()>;
}

/// Checkpoint sink held in memory
#[derive(Debug, Default)]
pub struct MemoryCheckpointSink {
    checkpoints: Mutex<HashMap<Uuid, Checkpoint>>,
    persist_calls: std::sync::atomic::AtomicU32,
}

impl MemoryCheckpointSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest checkpoint of a session
    pub async fn latest(&self, session_id: Uuid) -> Option<Checkpoint> {
        self.checkpoints.lock().await.get(&session_id).cloned()
    }

    pub fn persist_calls(&self) -> u32 {
        self.persist_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointSink for MemoryCheckpointSink {
    async fn persist(&self, checkpoint: &Checkpoint) -> kinload_common::Result<()> {
        self.persist_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.checkpoints
            .lock()
            .await
            .insert(checkpoint.session_id, checkpoint.clone());
        Ok(())
    }

    async fn discard(&self, session_id: Uuid) -> kinload_common::Result<()> {
        self.checkpoints.lock().await.remove(&session_id);
        Ok(())
    }
}

//! Fatal engine errors
//!
//! Recoverable problems never surface here: they are recorded in the
//! session error log and processing continues. An `EngineError` means the
//! caller cannot continue with this session as it stands.

use crate::models::ImportState;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Checkpoint blob is unreadable or fails its integrity digest
    #[error("checkpoint is corrupt: {0}")]
    CheckpointCorrupt(String),

    /// Checkpoint written by an incompatible engine version
    #[error("unsupported checkpoint format version {0}")]
    UnsupportedCheckpointVersion(u32),

    /// Resume attempted against a different source than the session started with
    #[error("source does not match session {session_id}")]
    SourceMismatch { session_id: Uuid },

    /// Operation not valid in the session's current state
    #[error("session {session_id} is {state:?}")]
    InvalidState { session_id: Uuid, state: ImportState },

    /// The checkpoint could not be persisted or discarded
    #[error("checkpoint sink failed: {0}")]
    Sink(#[from] kinload_common::Error),
}

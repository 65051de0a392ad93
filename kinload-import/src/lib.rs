//! kinload-import library
//!
//! Resumable import of genealogical interchange files into a relational
//! destination:
//! - [`parser`]: byte stream to record trees
//! - [`dates`]: date phrases to calendar-aware, comparable values
//! - [`transform`]: record trees to entity columns
//! - [`xref`]: cross-reference declaration and forward-reference settling
//! - [`store`]: the write interface and its SQLite and in-memory stores
//! - [`services`]: the phase-driven, checkpointing import orchestrator

pub mod dates;
pub mod db;
pub mod error;
pub mod models;
pub mod parser;
pub mod services;
pub mod store;
pub mod transform;
pub mod utils;
pub mod xref;

pub use crate::error::EngineError;
pub use crate::models::{
    ConflictPolicy, EntityKind, ErrorSeverity, ImportError, ImportOptions, ImportResult,
    ImportState, ImportStatistics, PrivacyOverrides,
};
pub use crate::services::{
    BatchLimits, Checkpoint, CheckpointSink, ImportOrchestrator, MemoryCheckpointSink, StepOutcome,
};
pub use crate::store::{EntityStore, MemoryStore, SqliteStore, StoreError};

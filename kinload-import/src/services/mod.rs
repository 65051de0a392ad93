//! Import services

pub mod import_orchestrator;

pub use import_orchestrator::{
    BatchLimits, Checkpoint, CheckpointPayload, CheckpointSink, ImportOrchestrator,
    MemoryCheckpointSink, StepOutcome,
};

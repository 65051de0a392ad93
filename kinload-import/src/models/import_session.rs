//! Import session state machine
//!
//! A session progresses through:
//! IDLE → PARSING → RESOLVING → PERSISTING → COMPLETED
//!
//! FAILED is entered on an unrecoverable error, CANCELLED on an explicit
//! abort. The whole struct is what a checkpoint carries between invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ImportError, ImportOptions, ImportStatistics};
use crate::store::LinkRecord;

/// Import session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportState {
    /// Created, nothing read yet
    Idle,
    /// Streaming records, writing entities and resolvable links
    Parsing,
    /// Settling forward references
    Resolving,
    /// Writing back-patched links
    Persisting,
    /// Import finished
    Completed,
    /// Import stopped by an unrecoverable error
    Failed,
    /// Import aborted by the caller
    Cancelled,
}

impl ImportState {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportState::Idle => "IDLE",
            ImportState::Parsing => "PARSING",
            ImportState::Resolving => "RESOLVING",
            ImportState::Persisting => "PERSISTING",
            ImportState::Completed => "COMPLETED",
            ImportState::Failed => "FAILED",
            ImportState::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImportState::Completed | ImportState::Failed | ImportState::Cancelled
        )
    }
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: ImportState,
    pub new_state: ImportState,
    pub transitioned_at: DateTime<Utc>,
}

/// Import session (checkpointed state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSession {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Current phase
    pub state: ImportState,

    /// Destination collection
    pub collection: String,

    pub options: ImportOptions,

    /// Byte offset of the next unprocessed record
    pub byte_offset: u64,

    /// Line number at `byte_offset`
    pub line_number: u64,

    pub statistics: ImportStatistics,

    /// Accumulated non-fatal (and the final fatal) errors
    pub errors: Vec<ImportError>,

    /// Replace policy: the collection clear has completed durably
    pub replace_cleared: bool,

    /// Links settled by the resolving phase, awaiting write
    pub resolved_links: Vec<LinkRecord>,

    /// How many of `resolved_links` are already written
    pub links_written: usize,

    /// Number of batches run
    pub batches: u32,

    /// Processing time summed over every batch, in milliseconds
    pub elapsed_ms: u64,

    pub started_at: DateTime<Utc>,

    /// Session end time (if completed/cancelled/failed)
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImportSession {
    /// Create new import session
    pub fn new(collection: String, options: ImportOptions) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: ImportState::Idle,
            collection,
            options,
            byte_offset: 0,
            line_number: 1,
            statistics: ImportStatistics::default(),
            errors: Vec::new(),
            replace_cleared: false,
            resolved_links: Vec::new(),
            links_written: 0,
            batches: 0,
            elapsed_ms: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: ImportState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Add error to session
    pub fn add_error(&mut self, error: ImportError) {
        self.errors.push(error);
    }

    /// Check if session is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let session = ImportSession::new("tree".to_string(), ImportOptions::default());
        assert_eq!(session.state, ImportState::Idle);
        assert_eq!(session.line_number, 1);
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_terminal_transition_sets_end_time() {
        let mut session = ImportSession::new("tree".to_string(), ImportOptions::default());
        let transition = session.transition_to(ImportState::Parsing);
        assert_eq!(transition.old_state, ImportState::Idle);
        assert!(session.ended_at.is_none());

        session.transition_to(ImportState::Failed);
        assert!(session.is_terminal());
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_state_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ImportState::Persisting).unwrap(),
            "\"PERSISTING\""
        );
        assert_eq!(ImportState::Cancelled.as_str(), "CANCELLED");
    }
}

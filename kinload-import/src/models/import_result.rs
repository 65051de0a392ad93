//! Import statistics, results and errors

use crate::models::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::ImportState;

/// Stable codes recorded in the session error log
pub mod error_codes {
    pub const DUPLICATE_XREF: &str = "DUPLICATE_XREF";
    pub const UNRESOLVED_REFERENCE: &str = "UNRESOLVED_REFERENCE";
    pub const WRONG_TARGET_KIND: &str = "WRONG_TARGET_KIND";
    pub const INVALID_DATE: &str = "INVALID_DATE";
    pub const UNKNOWN_RECORD: &str = "UNKNOWN_RECORD";
    pub const WRITE_FAILED: &str = "WRITE_FAILED";
    pub const WRITE_RETRIES_EXHAUSTED: &str = "WRITE_RETRIES_EXHAUSTED";
    pub const MEDIA_SKIPPED: &str = "MEDIA_SKIPPED";
    pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorSeverity {
    /// Bad data in one record; the record or field is skipped
    Record,
    /// Write failure that survived its retries; the record is skipped
    Session,
    /// The import cannot continue
    Fatal,
}

/// One entry of the session error log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportError {
    /// Source line the error refers to, when there is one
    pub source_line: Option<u64>,

    /// Error code (e.g. "MALFORMED_LINE", "WRITE_FAILED")
    pub error_code: String,

    /// Human-readable error message
    pub error_message: String,

    pub severity: ErrorSeverity,

    pub occurred_at: DateTime<Utc>,
}

impl ImportError {
    fn with_severity(
        severity: ErrorSeverity,
        source_line: Option<u64>,
        error_code: &str,
        error_message: String,
    ) -> Self {
        Self {
            source_line,
            error_code: error_code.to_string(),
            error_message,
            severity,
            occurred_at: Utc::now(),
        }
    }

    /// Create new record-level error
    pub fn record(source_line: Option<u64>, error_code: &str, error_message: String) -> Self {
        Self::with_severity(ErrorSeverity::Record, source_line, error_code, error_message)
    }

    /// Create new session-level error
    pub fn session(source_line: Option<u64>, error_code: &str, error_message: String) -> Self {
        Self::with_severity(ErrorSeverity::Session, source_line, error_code, error_message)
    }

    /// Create new fatal error
    pub fn fatal(source_line: Option<u64>, error_code: &str, error_message: String) -> Self {
        Self::with_severity(ErrorSeverity::Fatal, source_line, error_code, error_message)
    }
}

/// Running counters of one import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStatistics {
    /// Entities written per kind
    pub counts: BTreeMap<EntityKind, u64>,

    /// Records not written (parse errors, duplicates, failed writes, skipped media)
    pub records_skipped: u64,

    /// Link rows written
    pub links_written: u64,

    /// Link rows written without a target
    pub links_unresolved: u64,

    /// Event rows written (every dated or placed substructure)
    pub events_written: u64,

    /// Date fields kept as raw text
    pub dates_unparseable: u64,
}

impl ImportStatistics {
    pub fn record_entity(&mut self, kind: EntityKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    pub fn count(&self, kind: EntityKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_entities(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Outcome handed back to the caller once a session stops for good
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub session_id: Uuid,

    /// Terminal state (Completed, Failed or Cancelled)
    pub state: ImportState,

    /// True only for a session that ran to the end of its input
    pub completed: bool,

    pub statistics: ImportStatistics,

    /// Errors encountered (categorized by severity)
    pub errors: Vec<ImportError>,

    /// Processing time summed over every batch, in milliseconds
    pub duration_ms: u64,
}

impl ImportResult {
    /// Count errors by severity
    pub fn count_by_severity(&self, severity: ErrorSeverity) -> usize {
        self.errors.iter().filter(|e| e.severity == severity).count()
    }

    /// Count errors carrying one code
    pub fn count_by_code(&self, error_code: &str) -> usize {
        self.errors.iter().filter(|e| e.error_code == error_code).count()
    }
}

//! Data models for the import engine

pub mod entity;
pub mod import_result;
pub mod import_session;
pub mod parameters;

pub use entity::{Column, ColumnType, EntityKind};
pub use import_result::{error_codes, ErrorSeverity, ImportError, ImportResult, ImportStatistics};
pub use import_session::{ImportSession, ImportState, StateTransition};
pub use parameters::{ConflictPolicy, ImportOptions, PrivacyOverrides};

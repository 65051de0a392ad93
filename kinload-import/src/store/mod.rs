//! Destination write interface
//!
//! The engine never talks to a database directly; it writes through
//! [`EntityStore`]. Every operation must be safe to retry:
//!
//! - `commit` is idempotent per [`RecordOrigin`]: replaying the same origin
//!   returns the id assigned the first time instead of inserting again
//! - `write_link` is an upsert keyed by referrer, role and sequence
//! - `write_event` is an upsert keyed by owner, tag and sequence
//! - `clear_collection` on an empty collection is a no-op
//!
//! Implementations classify failures into [`StoreError`] so the engine can
//! decide between retrying, recording and failing the session.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::models::EntityKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identifier assigned by the store on commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(pub i64);

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where in which import an entity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordOrigin {
    pub session_id: Uuid,
    /// Byte offset of the record's level-0 line
    pub source_offset: u64,
}

/// Column value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Entity being assembled for a single write
#[derive(Debug, Clone, PartialEq)]
pub struct EntityHandle {
    pub kind: EntityKind,
    /// Destination collection
    pub scope: String,
    pub origin: RecordOrigin,
    pub xref: Option<String>,
    /// Existing entity to update in place (merge) instead of inserting
    pub existing: Option<StorageId>,
    /// Columns in the order they were set; later values win
    pub fields: Vec<(&'static str, FieldValue)>,
}

impl EntityHandle {
    pub fn new(kind: EntityKind, scope: &str, origin: RecordOrigin) -> Self {
        Self {
            kind,
            scope: scope.to_owned(),
            origin,
            xref: None,
            existing: None,
            fields: Vec::new(),
        }
    }

    /// Current value of a column, if set
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .rev()
            .find(|(column, _)| *column == name)
            .map(|(_, value)| value)
    }

    /// Column values with later assignments replacing earlier ones
    pub fn effective_fields(&self) -> Vec<(&'static str, &FieldValue)> {
        let mut out: Vec<(&'static str, &FieldValue)> = Vec::new();
        for (name, value) in &self.fields {
            match out.iter().position(|(n, _)| n == name) {
                Some(i) => out[i].1 = value,
                None => out.push((*name, value)),
            }
        }
        out
    }
}

/// Pointer from one entity to another, materialized as a link row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub from_kind: EntityKind,
    pub from_id: StorageId,
    /// Pointer tag (`HUSB`, `CHIL`, `SOUR`, ...)
    pub role: String,
    pub target_xref: String,
    pub target_kind: Option<EntityKind>,
    /// None when the target never resolved
    pub to_id: Option<StorageId>,
    /// Position among the referrer's pointers
    pub sequence: u32,
}

/// Dated or placed substructure of an entity (`BIRT`, `RESI`, `MARR`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub owner_kind: EntityKind,
    pub owner_id: StorageId,
    pub tag: String,
    /// Position among the owner's events with the same tag
    pub sequence: u32,
    /// Canonical date text, or the raw text when unparseable
    pub date: Option<String>,
    pub date_jd: Option<i64>,
    pub place: Option<String>,
}

/// Classified storage failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Worth retrying (lock contention, busy connection)
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// This write can never succeed (constraint, bad value)
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The store cannot accept writes at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage write interface used by the import engine
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Start assembling an entity; nothing is written until `commit`
    fn begin_entity(&self, kind: EntityKind, scope: &str, origin: RecordOrigin) -> EntityHandle {
        EntityHandle::new(kind, scope, origin)
    }

    /// Set one column; names outside the kind's column list are rejected
    fn set_field(
        &self,
        handle: &mut EntityHandle,
        name: &str,
        value: FieldValue,
    ) -> Result<(), StoreError> {
        let column = handle
            .kind
            .columns()
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                StoreError::Rejected(format!("{} has no column {}", handle.kind, name))
            })?;
        handle.fields.push((column.name, value));
        Ok(())
    }

    /// Write the entity and return its id
    ///
    /// Inserting an origin that was already committed returns the existing id.
    async fn commit(&self, handle: &EntityHandle) -> Result<StorageId, StoreError>;

    /// Entity of `kind` in `scope` carrying the given cross-reference
    async fn find_by_xref(
        &self,
        kind: EntityKind,
        scope: &str,
        xref: &str,
    ) -> Result<Option<StorageId>, StoreError>;

    /// Insert or replace a link row
    async fn write_link(&self, scope: &str, link: &LinkRecord) -> Result<(), StoreError>;

    /// Insert or replace an event row, keyed by owner, tag and sequence
    async fn write_event(&self, scope: &str, event: &EventRecord) -> Result<(), StoreError>;

    /// Delete the outgoing links and events of one entity
    ///
    /// Runs before a merged entity's rows are rewritten. Returns the number
    /// of rows removed; clearing twice is a no-op.
    async fn clear_owned(
        &self,
        kind: EntityKind,
        scope: &str,
        id: StorageId,
    ) -> Result<u64, StoreError>;

    /// Delete every entity of `kind` in `scope` together with its links and events
    ///
    /// Returns the number of entities removed.
    async fn clear_collection(&self, kind: EntityKind, scope: &str) -> Result<u64, StoreError>;
}

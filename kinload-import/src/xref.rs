//! Cross-reference resolution
//!
//! Interchange identifiers (`I1`, `F23`, ...) are mapped to the storage ids
//! their entities received on commit. A pointer to an identifier that has
//! not been declared yet is parked in the pending set and settled by
//! [`XrefResolver::finalize`] once the whole file has been read.
//!
//! The resolver is plain data so it can travel inside a checkpoint.

use crate::models::{error_codes, EntityKind};
use crate::store::{LinkRecord, StorageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Declared identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrefEntry {
    pub entity_kind: EntityKind,
    pub storage_id: StorageId,
}

/// The entity field holding a pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referrer {
    pub kind: EntityKind,
    pub storage_id: StorageId,
    /// Pointer tag
    pub role: String,
    /// Position among the referrer's pointers
    pub sequence: u32,
    /// Kind the pointer must lead to, when the tag implies one
    pub expected: Option<EntityKind>,
    pub line_number: u64,
}

impl Referrer {
    /// Link row for this pointer
    pub fn link(&self, target_xref: &str, to_id: Option<StorageId>) -> LinkRecord {
        LinkRecord {
            from_kind: self.kind,
            from_id: self.storage_id,
            role: self.role.clone(),
            target_xref: target_xref.to_owned(),
            target_kind: self.expected,
            to_id,
            sequence: self.sequence,
        }
    }
}

/// Reference parked until its target is declared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRef {
    pub target: String,
    pub referrer: Referrer,
}

/// Handle to a parked reference (its position in the pending set)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingToken(pub usize);

/// Outcome of resolving a pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(StorageId),
    Pending(PendingToken),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XrefError {
    #[error("line {line_number}: @{xref}@ is already declared as {existing}")]
    DuplicateXref {
        xref: String,
        existing: EntityKind,
        line_number: u64,
    },

    #[error("line {line_number}: {role} points to undeclared @{xref}@")]
    UnresolvedReference {
        xref: String,
        role: String,
        line_number: u64,
    },

    #[error("line {line_number}: {role} expects {expected} but @{xref}@ is {actual}")]
    WrongTargetKind {
        xref: String,
        role: String,
        expected: EntityKind,
        actual: EntityKind,
        line_number: u64,
    },
}

impl XrefError {
    pub fn line_number(&self) -> u64 {
        match self {
            XrefError::DuplicateXref { line_number, .. }
            | XrefError::UnresolvedReference { line_number, .. }
            | XrefError::WrongTargetKind { line_number, .. } => *line_number,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            XrefError::DuplicateXref { .. } => error_codes::DUPLICATE_XREF,
            XrefError::UnresolvedReference { .. } => error_codes::UNRESOLVED_REFERENCE,
            XrefError::WrongTargetKind { .. } => error_codes::WRONG_TARGET_KIND,
        }
    }
}

/// Links and errors produced by settling the pending set
#[derive(Debug, Default)]
pub struct Finalization {
    /// One link per pending reference; `to_id` is None when it did not resolve
    pub links: Vec<LinkRecord>,
    pub errors: Vec<XrefError>,
}

/// Identifier table plus pending forward references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrefResolver {
    declared: BTreeMap<String, XrefEntry>,
    pending: Vec<PendingRef>,
}

impl XrefResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the storage id of an identifier
    ///
    /// Identifiers are write-once: a second declaration is rejected and the
    /// first mapping stays.
    pub fn declare(
        &mut self,
        xref: &str,
        entity_kind: EntityKind,
        storage_id: StorageId,
        line_number: u64,
    ) -> Result<(), XrefError> {
        if let Some(existing) = self.declared.get(xref) {
            return Err(XrefError::DuplicateXref {
                xref: xref.to_owned(),
                existing: existing.entity_kind,
                line_number,
            });
        }
        self.declared.insert(
            xref.to_owned(),
            XrefEntry {
                entity_kind,
                storage_id,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, xref: &str) -> Option<&XrefEntry> {
        self.declared.get(xref)
    }

    pub fn declared_count(&self) -> usize {
        self.declared.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolve a pointer now, or park it for `finalize`
    ///
    /// A declared target of the wrong kind is an error; the caller leaves
    /// the field unset.
    pub fn resolve(&mut self, xref: &str, referrer: Referrer) -> Result<Resolution, XrefError> {
        match self.declared.get(xref) {
            Some(entry) => {
                check_kind(xref, &referrer, entry)?;
                Ok(Resolution::Resolved(entry.storage_id))
            }
            None => {
                self.pending.push(PendingRef {
                    target: xref.to_owned(),
                    referrer,
                });
                Ok(Resolution::Pending(PendingToken(self.pending.len() - 1)))
            }
        }
    }

    /// Settle every pending reference
    ///
    /// Drains the pending set, so calling it again yields nothing new.
    pub fn finalize(&mut self) -> Finalization {
        let mut out = Finalization::default();
        for PendingRef { target, referrer } in self.pending.drain(..) {
            let to_id = match self.declared.get(&target) {
                Some(entry) => match check_kind(&target, &referrer, entry) {
                    Ok(()) => Some(entry.storage_id),
                    Err(e) => {
                        out.errors.push(e);
                        None
                    }
                },
                None => {
                    out.errors.push(XrefError::UnresolvedReference {
                        xref: target.clone(),
                        role: referrer.role.clone(),
                        line_number: referrer.line_number,
                    });
                    None
                }
            };
            out.links.push(referrer.link(&target, to_id));
        }
        out
    }
}

fn check_kind(xref: &str, referrer: &Referrer, entry: &XrefEntry) -> Result<(), XrefError> {
    match referrer.expected {
        Some(expected) if expected != entry.entity_kind => Err(XrefError::WrongTargetKind {
            xref: xref.to_owned(),
            role: referrer.role.clone(),
            expected,
            actual: entry.entity_kind,
            line_number: referrer.line_number,
        }),
        _ => Ok(()),
    }
}

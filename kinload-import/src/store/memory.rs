//! In-process entity store
//!
//! Keeps entities and links in memory with the same idempotency rules as the
//! SQLite store. Failure injection switches make it the store of choice for
//! exercising retry and failure paths:
//!
//! - [`MemoryStore::fail_next_commits`]: the next N commits fail transiently
//! - [`MemoryStore::reject_xref`]: commits for one cross-reference are rejected
//! - [`MemoryStore::set_unavailable`]: every operation fails as unavailable

use super::{
    EntityHandle, EntityStore, EventRecord, FieldValue, LinkRecord, RecordOrigin, StorageId,
    StoreError,
};
use crate::models::EntityKind;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Mutex;

/// Stored entity
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    pub id: StorageId,
    pub kind: EntityKind,
    pub scope: String,
    pub xref: Option<String>,
    pub origin: RecordOrigin,
    pub fields: BTreeMap<String, FieldValue>,
}

impl MemoryRow {
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.fields.get(column) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.fields.get(column) {
            Some(FieldValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    rows: Vec<MemoryRow>,
    /// (scope, link)
    links: Vec<(String, LinkRecord)>,
    /// (scope, event)
    events: Vec<(String, EventRecord)>,
}

/// Entity store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    transient_failures: AtomicU32,
    unavailable: AtomicBool,
    rejected_xrefs: std::sync::Mutex<HashSet<String>>,
    commit_attempts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with a transient error
    pub fn fail_next_commits(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Reject every commit of the entity carrying this cross-reference
    pub fn reject_xref(&self, xref: &str) {
        if let Ok(mut rejected) = self.rejected_xrefs.lock() {
            rejected.insert(xref.to_owned());
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Commit calls seen so far, including failed ones
    pub fn commit_attempts(&self) -> u32 {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    fn is_rejected(&self, xref: Option<&str>) -> bool {
        match (xref, self.rejected_xrefs.lock()) {
            (Some(xref), Ok(rejected)) => rejected.contains(xref),
            _ => false,
        }
    }

    /// Entities of one kind in a collection, in id order
    pub async fn rows(&self, kind: EntityKind, scope: &str) -> Vec<MemoryRow> {
        let inner = self.inner.lock().await;
        inner
            .rows
            .iter()
            .filter(|row| row.kind == kind && row.scope == scope)
            .cloned()
            .collect()
    }

    pub async fn count(&self, kind: EntityKind, scope: &str) -> usize {
        self.rows(kind, scope).await.len()
    }

    pub async fn row_by_xref(&self, kind: EntityKind, scope: &str, xref: &str) -> Option<MemoryRow> {
        self.rows(kind, scope)
            .await
            .into_iter()
            .find(|row| row.xref.as_deref() == Some(xref))
    }

    /// Links stored for a collection
    pub async fn links(&self, scope: &str) -> Vec<LinkRecord> {
        let inner = self.inner.lock().await;
        inner
            .links
            .iter()
            .filter(|(s, _)| s == scope)
            .map(|(_, link)| link.clone())
            .collect()
    }

    /// Events stored for a collection
    pub async fn events(&self, scope: &str) -> Vec<EventRecord> {
        let inner = self.inner.lock().await;
        inner
            .events
            .iter()
            .filter(|(s, _)| s == scope)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn commit(&self, handle: &EntityHandle) -> Result<StorageId, StoreError> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let pending_failures = self.transient_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.transient_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(StoreError::Transient("injected lock contention".to_string()));
        }

        if self.is_rejected(handle.xref.as_deref()) {
            return Err(StoreError::Rejected(format!(
                "constraint violation for {}",
                handle.xref.as_deref().unwrap_or_default()
            )));
        }

        let fields: BTreeMap<String, FieldValue> = handle
            .effective_fields()
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect();

        let mut inner = self.inner.lock().await;

        if let Some(existing) = handle.existing {
            let row = inner
                .rows
                .iter_mut()
                .find(|row| row.id == existing && row.kind == handle.kind)
                .ok_or_else(|| StoreError::Rejected(format!("no {} with id {}", handle.kind, existing)))?;
            row.fields.extend(fields);
            row.origin = handle.origin;
            return Ok(existing);
        }

        if let Some(row) = inner
            .rows
            .iter()
            .find(|row| row.kind == handle.kind && row.origin == handle.origin)
        {
            return Ok(row.id);
        }

        inner.next_id += 1;
        let id = StorageId(inner.next_id);
        inner.rows.push(MemoryRow {
            id,
            kind: handle.kind,
            scope: handle.scope.clone(),
            xref: handle.xref.clone(),
            origin: handle.origin,
            fields,
        });
        Ok(id)
    }

    async fn find_by_xref(
        &self,
        kind: EntityKind,
        scope: &str,
        xref: &str,
    ) -> Result<Option<StorageId>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .iter()
            .find(|row| row.kind == kind && row.scope == scope && row.xref.as_deref() == Some(xref))
            .map(|row| row.id))
    }

    async fn write_link(&self, scope: &str, link: &LinkRecord) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let existing = inner.links.iter().position(|(s, l)| {
            s == scope
                && l.from_kind == link.from_kind
                && l.from_id == link.from_id
                && l.role == link.role
                && l.sequence == link.sequence
        });
        match existing {
            Some(i) => inner.links[i].1 = link.clone(),
            None => inner.links.push((scope.to_owned(), link.clone())),
        }
        Ok(())
    }

    async fn write_event(&self, scope: &str, event: &EventRecord) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let existing = inner.events.iter().position(|(s, e)| {
            s == scope
                && e.owner_kind == event.owner_kind
                && e.owner_id == event.owner_id
                && e.tag == event.tag
                && e.sequence == event.sequence
        });
        match existing {
            Some(i) => inner.events[i].1 = event.clone(),
            None => inner.events.push((scope.to_owned(), event.clone())),
        }
        Ok(())
    }

    async fn clear_owned(
        &self,
        kind: EntityKind,
        scope: &str,
        id: StorageId,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let before = inner.links.len() + inner.events.len();
        inner
            .links
            .retain(|(s, link)| !(s == scope && link.from_kind == kind && link.from_id == id));
        inner
            .events
            .retain(|(s, event)| !(s == scope && event.owner_kind == kind && event.owner_id == id));
        Ok((before - inner.links.len() - inner.events.len()) as u64)
    }

    async fn clear_collection(&self, kind: EntityKind, scope: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let before = inner.rows.len();
        inner.rows.retain(|row| !(row.kind == kind && row.scope == scope));
        inner
            .links
            .retain(|(s, link)| !(s == scope && link.from_kind == kind));
        inner
            .events
            .retain(|(s, event)| !(s == scope && event.owner_kind == kind));
        Ok((before - inner.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn origin(offset: u64) -> RecordOrigin {
        RecordOrigin {
            session_id: Uuid::nil(),
            source_offset: offset,
        }
    }

    fn note(store: &MemoryStore, offset: u64, text: &str) -> EntityHandle {
        let mut handle = store.begin_entity(EntityKind::Note, "tree", origin(offset));
        store
            .set_field(&mut handle, "text", FieldValue::from(text))
            .unwrap();
        handle
    }

    #[tokio::test]
    async fn test_commit_is_idempotent_per_origin() {
        let store = MemoryStore::new();
        let first = store.commit(&note(&store, 10, "a")).await.unwrap();
        let replay = store.commit(&note(&store, 10, "a")).await.unwrap();
        let other = store.commit(&note(&store, 20, "b")).await.unwrap();

        assert_eq!(first, replay);
        assert_ne!(first, other);
        assert_eq!(store.count(EntityKind::Note, "tree").await, 2);
    }

    #[tokio::test]
    async fn test_unknown_column_rejected() {
        let store = MemoryStore::new();
        let mut handle = store.begin_entity(EntityKind::Note, "tree", origin(0));
        let result = store.set_field(&mut handle, "surname", FieldValue::from("x"));
        assert!(matches!(result, Err(StoreError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_injected_transient_failures_run_out() {
        let store = MemoryStore::new();
        store.fail_next_commits(2);
        let handle = note(&store, 0, "a");
        assert!(matches!(store.commit(&handle).await, Err(StoreError::Transient(_))));
        assert!(matches!(store.commit(&handle).await, Err(StoreError::Transient(_))));
        assert!(store.commit(&handle).await.is_ok());
        assert_eq!(store.commit_attempts(), 3);
    }

    #[tokio::test]
    async fn test_clear_collection_is_scoped() {
        let store = MemoryStore::new();
        store.commit(&note(&store, 0, "a")).await.unwrap();
        let mut other = store.begin_entity(EntityKind::Note, "other", origin(1));
        other.fields.push(("text", FieldValue::from("b")));
        store.commit(&other).await.unwrap();

        assert_eq!(store.clear_collection(EntityKind::Note, "tree").await.unwrap(), 1);
        assert_eq!(store.clear_collection(EntityKind::Note, "tree").await.unwrap(), 0);
        assert_eq!(store.count(EntityKind::Note, "other").await, 1);
    }

    #[tokio::test]
    async fn test_link_upsert() {
        let store = MemoryStore::new();
        let mut link = LinkRecord {
            from_kind: EntityKind::Family,
            from_id: StorageId(1),
            role: "HUSB".to_string(),
            target_xref: "I1".to_string(),
            target_kind: Some(EntityKind::Individual),
            to_id: None,
            sequence: 0,
        };
        store.write_link("tree", &link).await.unwrap();
        link.to_id = Some(StorageId(7));
        store.write_link("tree", &link).await.unwrap();

        let links = store.links("tree").await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].to_id, Some(StorageId(7)));
    }

    #[tokio::test]
    async fn test_clear_owned_keeps_other_entities() {
        let store = MemoryStore::new();
        let link = |from: i64, sequence: u32| LinkRecord {
            from_kind: EntityKind::Family,
            from_id: StorageId(from),
            role: "CHIL".to_string(),
            target_xref: "I1".to_string(),
            target_kind: Some(EntityKind::Individual),
            to_id: Some(StorageId(9)),
            sequence,
        };
        store.write_link("tree", &link(1, 0)).await.unwrap();
        store.write_link("tree", &link(1, 1)).await.unwrap();
        store.write_link("tree", &link(2, 0)).await.unwrap();
        store
            .write_event(
                "tree",
                &EventRecord {
                    owner_kind: EntityKind::Family,
                    owner_id: StorageId(1),
                    tag: "MARR".to_string(),
                    sequence: 0,
                    date: Some("1900".to_string()),
                    date_jd: Some(2_415_021),
                    place: None,
                },
            )
            .await
            .unwrap();

        let removed = store
            .clear_owned(EntityKind::Family, "tree", StorageId(1))
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.links("tree").await, vec![link(2, 0)]);
        assert!(store.events("tree").await.is_empty());
        assert_eq!(
            store
                .clear_owned(EntityKind::Family, "tree", StorageId(1))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let result = store.commit(&note(&store, 0, "a")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}

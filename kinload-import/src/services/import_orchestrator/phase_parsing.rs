//! PARSING phase
//!
//! Streams records from the checkpointed byte offset, transforms each one,
//! writes the entity, its events and every link whose target is already
//! known.

use super::{BatchClock, CheckpointSink, ImportOrchestrator, Interrupt};
use crate::error::EngineError;
use crate::models::{error_codes, ConflictPolicy, EntityKind, ImportError};
use crate::parser::{LineNormalizer, ParseError, Record, RecordAssembler, RecordKind, Tokenizer};
use crate::store::{EntityStore, EventRecord, RecordOrigin, StorageId, StoreError};
use crate::transform::{transform_record, TransformContext};
use crate::utils::retry_transient;
use crate::xref::{Referrer, Resolution, XrefError};
use chrono::Datelike;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl<S, K> ImportOrchestrator<S, K>
where
    S: EntityStore,
    K: CheckpointSink,
{
    /// Execute PARSING phase
    ///
    /// **Algorithm:**
    /// 1. Under `Replace`, clear the collection once (durably bracketed)
    /// 2. Resume the line stream at the stored offset
    /// 3. For each record: skip, or transform + commit + declare + events + links
    /// 4. After each record advance the offset; suspend when limits are hit
    ///
    /// Returns None once the stream is exhausted (or the trailer is reached).
    pub(super) async fn phase_parsing(
        &mut self,
        clock: &mut BatchClock,
    ) -> Result<Option<Interrupt>, EngineError> {
        if self.session.options.conflict_policy == ConflictPolicy::Replace
            && !self.session.replace_cleared
        {
            if let Some(interrupt) = self.clear_for_replace().await? {
                return Ok(Some(interrupt));
            }
        }

        let source = Arc::clone(&self.source);
        let lines =
            LineNormalizer::resume_at(&source, self.session.byte_offset, self.session.line_number);
        let mut records = RecordAssembler::new(Tokenizer::new(lines));

        while let Some(item) = records.next() {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    self.record_parse_error(&e);
                    continue;
                }
            };

            match &record.kind {
                RecordKind::Trailer => {
                    debug!(line = record.line_number(), "Trailer reached");
                    self.mark_stream_end();
                    return Ok(None);
                }
                RecordKind::Unknown(tag) => {
                    warn!(
                        line = record.line_number(),
                        tag = %tag,
                        "Skipping unknown record type"
                    );
                    self.session.statistics.records_skipped += 1;
                    self.session.add_error(ImportError::record(
                        Some(record.line_number()),
                        error_codes::UNKNOWN_RECORD,
                        format!("unknown record type {}", tag),
                    ));
                }
                RecordKind::Entity(kind) => {
                    if let Err(cause) = self.import_entity(*kind, &record).await {
                        return Ok(Some(Interrupt::Fatal(cause)));
                    }
                }
            }

            clock.tick();
            match records.resume_point() {
                Some(point) => {
                    self.session.byte_offset = point.offset;
                    self.session.line_number = point.line_number;
                }
                None => self.mark_stream_end(),
            }

            if clock.exhausted() {
                return Ok(Some(Interrupt::Suspend));
            }
        }

        self.mark_stream_end();
        Ok(None)
    }

    fn mark_stream_end(&mut self) {
        self.session.byte_offset = self.source.len() as u64;
    }

    /// Clear every entity table of the collection
    ///
    /// The flag is persisted false before and true after, so a session
    /// interrupted mid-clear clears again on resume.
    async fn clear_for_replace(&mut self) -> Result<Option<Interrupt>, EngineError> {
        self.persist_checkpoint().await?;

        let mut removed = 0u64;
        for kind in EntityKind::ALL {
            let store = Arc::clone(&self.store);
            let scope = self.session.collection.clone();
            let operation = format!("clear {}", kind);
            match retry_transient(&operation, self.retry, || store.clear_collection(kind, &scope))
                .await
            {
                Ok(count) => removed += count,
                Err(cause) => return Ok(Some(Interrupt::Fatal(cause))),
            }
        }

        self.session.replace_cleared = true;
        self.persist_checkpoint().await?;
        info!(
            session_id = %self.session.session_id,
            collection = %self.session.collection,
            removed,
            "Collection cleared for replace"
        );
        Ok(None)
    }

    fn record_parse_error(&mut self, error: &ParseError) {
        warn!(
            line = error.line_number(),
            error_code = error.error_code(),
            "{}",
            error
        );
        if matches!(error, ParseError::LevelSkew { .. }) {
            self.session.statistics.records_skipped += 1;
        }
        self.session.add_error(ImportError::record(
            Some(error.line_number()),
            error.error_code(),
            error.to_string(),
        ));
    }

    /// Transform, write and link one entity record
    ///
    /// Only an unavailable store is returned as an error; every other
    /// failure is recorded and the stream continues.
    async fn import_entity(&mut self, kind: EntityKind, record: &Record) -> Result<(), StoreError> {
        let line = record.line_number();

        if kind == EntityKind::MediaObject && !self.session.options.include_media {
            debug!(line, "Media object skipped");
            self.session.statistics.records_skipped += 1;
            self.session.add_error(ImportError::record(
                Some(line),
                error_codes::MEDIA_SKIPPED,
                "media objects excluded from this import".to_string(),
            ));
            return Ok(());
        }

        if let Some(xref) = record.xref() {
            if let Some(entry) = self.resolver.lookup(xref) {
                let error = XrefError::DuplicateXref {
                    xref: xref.to_owned(),
                    existing: entry.entity_kind,
                    line_number: line,
                };
                self.record_xref_error(&error);
                self.session.statistics.records_skipped += 1;
                return Ok(());
            }
        }

        let ctx = TransformContext {
            options: &self.session.options,
            reference_year: self.session.started_at.year(),
        };
        let draft = transform_record(kind, &record.root, &ctx);

        let origin = RecordOrigin {
            session_id: self.session.session_id,
            source_offset: record.offset,
        };
        let mut handle = self
            .store
            .begin_entity(kind, &self.session.collection, origin);
        handle.xref = record.xref().map(str::to_owned);
        for (name, value) in draft.fields {
            if let Err(e) = self.store.set_field(&mut handle, name, value) {
                warn!(line, column = name, error = %e, "Field not written");
                self.session.add_error(ImportError::record(
                    Some(line),
                    error_codes::WRITE_FAILED,
                    e.to_string(),
                ));
            }
        }

        let store = Arc::clone(&self.store);
        if self.session.options.conflict_policy == ConflictPolicy::Merge {
            if let Some(xref) = record.xref() {
                let scope = self.session.collection.clone();
                let found = retry_transient("find existing entity", self.retry, || {
                    store.find_by_xref(kind, &scope, xref)
                })
                .await;
                match found {
                    Ok(existing) => handle.existing = existing,
                    Err(cause) => return self.record_write_failure(Some(line), cause, true),
                }
            }
        }

        let operation = format!("commit {}", kind);
        let storage_id = match retry_transient(&operation, self.retry, || store.commit(&handle)).await {
            Ok(id) => id,
            Err(cause) => return self.record_write_failure(Some(line), cause, true),
        };

        debug!(
            line,
            kind = %kind,
            storage_id = %storage_id,
            merged = handle.existing.is_some(),
            "Entity committed"
        );
        self.session.statistics.record_entity(kind);
        self.session.statistics.dates_unparseable += draft.dates_unparseable;
        for issue in draft.issues {
            warn!(
                line = issue.source_line,
                error_code = %issue.error_code,
                "{}",
                issue.error_message
            );
            self.session.add_error(issue);
        }

        if let Some(xref) = record.xref() {
            if let Err(e) = self.resolver.declare(xref, kind, storage_id, line) {
                self.record_xref_error(&e);
            }
        }

        if handle.existing.is_some() {
            // A merged entity's links and events are replaced, not extended
            let scope = self.session.collection.clone();
            let cleared = retry_transient("clear merged entity rows", self.retry, || {
                store.clear_owned(kind, &scope, storage_id)
            })
            .await;
            match cleared {
                Ok(removed) => {
                    debug!(line, storage_id = %storage_id, removed, "Merged entity rows cleared")
                }
                Err(cause) => self.record_write_failure(Some(line), cause, false)?,
            }
        }

        for event in &draft.events {
            let row = event.to_record(kind, storage_id);
            self.persist_event(&row, event.line_number).await?;
        }

        for pointer in draft.pointers {
            let referrer = Referrer {
                kind,
                storage_id,
                role: pointer.role,
                sequence: pointer.sequence,
                expected: pointer.expected,
                line_number: pointer.line_number,
            };
            let to_id: Option<StorageId> = match self.resolver.resolve(&pointer.target, referrer.clone()) {
                Ok(Resolution::Resolved(id)) => Some(id),
                Ok(Resolution::Pending(_)) => continue,
                Err(e) => {
                    self.record_xref_error(&e);
                    None
                }
            };
            let link = referrer.link(&pointer.target, to_id);
            self.persist_link(&link, Some(pointer.line_number)).await?;
        }

        Ok(())
    }

    /// Write one event row and count it
    async fn persist_event(&mut self, event: &EventRecord, line: u64) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        let scope = self.session.collection.clone();
        let written =
            retry_transient("write event", self.retry, || store.write_event(&scope, event)).await;

        match written {
            Ok(()) => {
                self.session.statistics.events_written += 1;
                Ok(())
            }
            Err(cause) => self.record_write_failure(Some(line), cause, false),
        }
    }

    pub(super) fn record_xref_error(&mut self, error: &XrefError) {
        warn!(
            line = error.line_number(),
            error_code = error.error_code(),
            "{}",
            error
        );
        self.session.add_error(ImportError::record(
            Some(error.line_number()),
            error.error_code(),
            error.to_string(),
        ));
    }

    /// Record a write that did not go through
    ///
    /// Rejected writes are record errors, exhausted retries are session
    /// errors; an unavailable store is handed back to fail the session.
    pub(super) fn record_write_failure(
        &mut self,
        line: Option<u64>,
        cause: StoreError,
        skips_record: bool,
    ) -> Result<(), StoreError> {
        let error = match &cause {
            StoreError::Unavailable(_) => return Err(cause),
            StoreError::Rejected(message) => {
                ImportError::record(line, error_codes::WRITE_FAILED, message.clone())
            }
            StoreError::Transient(message) => ImportError::session(
                line,
                error_codes::WRITE_RETRIES_EXHAUSTED,
                format!("gave up after {} attempts: {}", self.retry.max_attempts, message),
            ),
        };
        warn!(line, error_code = %error.error_code, error = %cause, "Write failed");
        if skips_record {
            self.session.statistics.records_skipped += 1;
        }
        self.session.add_error(error);
        Ok(())
    }
}

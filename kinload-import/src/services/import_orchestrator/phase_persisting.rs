//! PERSISTING phase
//!
//! Writes the links settled by RESOLVING. `links_written` is the cursor
//! into `resolved_links`, so a suspended session continues where it
//! stopped; link writes are upserts, so a replayed link is harmless.

use super::{BatchClock, CheckpointSink, ImportOrchestrator, Interrupt};
use crate::error::EngineError;
use crate::store::{EntityStore, LinkRecord, StoreError};
use crate::utils::retry_transient;
use std::sync::Arc;
use tracing::{debug, info};

impl<S, K> ImportOrchestrator<S, K>
where
    S: EntityStore,
    K: CheckpointSink,
{
    /// Execute PERSISTING phase
    ///
    /// Returns None once every settled link is written.
    pub(super) async fn phase_persisting(
        &mut self,
        clock: &mut BatchClock,
    ) -> Result<Option<Interrupt>, EngineError> {
        let total = self.session.resolved_links.len();

        while self.session.links_written < total {
            let link = self.session.resolved_links[self.session.links_written].clone();
            if let Err(cause) = self.persist_link(&link, None).await {
                return Ok(Some(Interrupt::Fatal(cause)));
            }
            self.session.links_written += 1;

            clock.tick();
            if clock.exhausted() && self.session.links_written < total {
                return Ok(Some(Interrupt::Suspend));
            }
        }

        info!(
            session_id = %self.session.session_id,
            links = total,
            "Back-patched links written"
        );
        Ok(None)
    }

    /// Write one link row and count it
    ///
    /// Failures other than an unavailable store are recorded.
    pub(super) async fn persist_link(
        &mut self,
        link: &LinkRecord,
        line: Option<u64>,
    ) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        let scope = self.session.collection.clone();
        let written =
            retry_transient("write link", self.retry, || store.write_link(&scope, link)).await;

        match written {
            Ok(()) => {
                debug!(
                    from = %link.from_id,
                    role = %link.role,
                    target = %link.target_xref,
                    resolved = link.to_id.is_some(),
                    "Link written"
                );
                self.session.statistics.links_written += 1;
                if link.to_id.is_none() {
                    self.session.statistics.links_unresolved += 1;
                }
                Ok(())
            }
            Err(cause) => self.record_write_failure(line, cause, false),
        }
    }
}

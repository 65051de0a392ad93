//! RESOLVING phase
//!
//! Settles every forward reference parked during parsing. The links are
//! kept in the session so the PERSISTING phase can write them in batches.

use super::{CheckpointSink, ImportOrchestrator};
use crate::store::EntityStore;
use crate::xref::Finalization;
use tracing::info;

impl<S, K> ImportOrchestrator<S, K>
where
    S: EntityStore,
    K: CheckpointSink,
{
    /// Execute RESOLVING phase
    ///
    /// Unresolved and wrongly-typed targets are recorded as errors; their
    /// links still go out with no target.
    pub(super) fn phase_resolving(&mut self) {
        let Finalization { links, errors } = self.resolver.finalize();

        info!(
            session_id = %self.session.session_id,
            forward_refs = links.len(),
            unresolved = errors.len(),
            declared = self.resolver.declared_count(),
            "Forward references settled"
        );

        for error in &errors {
            self.record_xref_error(error);
        }
        self.session.resolved_links = links;
        self.session.links_written = 0;
    }
}

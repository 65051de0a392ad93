//! Import orchestrator
//!
//! Drives one import session through its phases and makes it resumable
//! across short-lived invocations.
//!
//! # State Progression
//! IDLE → PARSING → RESOLVING → PERSISTING → COMPLETED
//!
//! FAILED when the store becomes unavailable, CANCELLED on [`ImportOrchestrator::abort`].
//!
//! # Architecture
//! Each phase is handled by a dedicated `phase_*` module:
//!
//! - **PARSING**: stream records from the stored byte offset, transform,
//!   write entities and immediately resolvable links
//! - **RESOLVING**: settle forward references
//! - **PERSISTING**: write the back-patched links, resumable by cursor
//!
//! The caller bounds every invocation with [`BatchLimits`]. When a limit is
//! reached between records the session is checkpointed and
//! [`StepOutcome::Suspended`] is returned; the checkpoint can be handed to
//! [`ImportOrchestrator::resume`] in a later invocation. The checkpoint sink
//! is also called at every phase boundary.

mod checkpoint;
mod phase_parsing;
mod phase_persisting;
mod phase_resolving;

pub use checkpoint::{
    sha256_hex, Checkpoint, CheckpointPayload, CheckpointSink, MemoryCheckpointSink,
    CHECKPOINT_FORMAT_VERSION,
};

use crate::error::EngineError;
use crate::models::{error_codes, ImportError, ImportOptions, ImportResult, ImportSession, ImportState};
use crate::store::{EntityStore, StoreError};
use crate::utils::RetryPolicy;
use crate::xref::XrefResolver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Bounds of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Records (or links, while persisting) handled before suspending
    pub max_records: usize,
    /// Wall-clock budget
    pub time_budget: Duration,
}

impl BatchLimits {
    pub fn new(max_records: usize, time_budget: Duration) -> Self {
        Self {
            max_records: max_records.max(1),
            time_budget,
        }
    }

    /// No practical limit (single-invocation imports)
    pub fn unbounded() -> Self {
        Self {
            max_records: usize::MAX,
            time_budget: Duration::MAX,
        }
    }
}

/// Result of one invocation
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Limits reached; continue later from this checkpoint
    Suspended(Checkpoint),
    /// Session reached a terminal state
    Finished(ImportResult),
}

/// Budget tracking for the running batch
pub(super) struct BatchClock {
    started: Instant,
    limits: BatchLimits,
    handled: usize,
}

impl BatchClock {
    fn new(limits: BatchLimits) -> Self {
        Self {
            started: Instant::now(),
            limits,
            handled: 0,
        }
    }

    fn tick(&mut self) {
        self.handled += 1;
    }

    fn exhausted(&self) -> bool {
        self.handled >= self.limits.max_records || self.started.elapsed() >= self.limits.time_budget
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Why a phase stopped early
pub(super) enum Interrupt {
    /// Batch limits reached
    Suspend,
    /// Store unavailable (or the replace clear failed); the session must fail
    Fatal(StoreError),
}

/// Import orchestrator service
pub struct ImportOrchestrator<S, K> {
    store: Arc<S>,
    sink: Arc<K>,
    source: Arc<[u8]>,
    source_digest: String,
    session: ImportSession,
    resolver: XrefResolver,
    retry: RetryPolicy,
}

impl<S, K> ImportOrchestrator<S, K>
where
    S: EntityStore,
    K: CheckpointSink,
{
    /// Create a new session and persist its initial checkpoint
    ///
    /// # Arguments
    /// * `source` - Complete interchange file contents
    /// * `collection` - Destination collection the records belong to
    /// * `options` - Conflict policy, media and privacy options
    /// * `store` - Destination write interface
    /// * `sink` - Where checkpoints are made durable
    pub async fn start(
        source: Vec<u8>,
        collection: &str,
        options: ImportOptions,
        store: Arc<S>,
        sink: Arc<K>,
    ) -> Result<Self, EngineError> {
        let session = ImportSession::new(collection.to_owned(), options);
        let source_digest = sha256_hex(&source);

        info!(
            session_id = %session.session_id,
            collection,
            policy = ?session.options.conflict_policy,
            bytes = source.len(),
            "Import session created"
        );

        let orchestrator = Self {
            store,
            sink,
            source: Arc::from(source),
            source_digest,
            session,
            resolver: XrefResolver::new(),
            retry: RetryPolicy::default(),
        };
        orchestrator.persist_checkpoint().await?;
        Ok(orchestrator)
    }

    /// Continue a session from a checkpoint
    ///
    /// Fails with `SourceMismatch` when `source` is not the file the session
    /// started with.
    pub fn resume(
        checkpoint: &Checkpoint,
        source: Vec<u8>,
        store: Arc<S>,
        sink: Arc<K>,
    ) -> Result<Self, EngineError> {
        let payload = checkpoint.decode()?;
        let source_digest = sha256_hex(&source);
        if source_digest != payload.source_digest {
            return Err(EngineError::SourceMismatch {
                session_id: payload.session.session_id,
            });
        }

        info!(
            session_id = %payload.session.session_id,
            state = payload.session.state.as_str(),
            byte_offset = payload.session.byte_offset,
            "Import session resumed"
        );

        Ok(Self {
            store,
            sink,
            source: Arc::from(source),
            source_digest,
            session: payload.session,
            resolver: payload.resolver,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the transient-write retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn session(&self) -> &ImportSession {
        &self.session
    }

    pub fn resolver(&self) -> &XrefResolver {
        &self.resolver
    }

    /// Snapshot of the current state
    pub fn checkpoint(&self) -> Result<Checkpoint, EngineError> {
        Checkpoint::encode(&CheckpointPayload {
            session: self.session.clone(),
            resolver: self.resolver.clone(),
            source_digest: self.source_digest.clone(),
        })
    }

    async fn persist_checkpoint(&self) -> Result<Checkpoint, EngineError> {
        let checkpoint = self.checkpoint()?;
        self.sink.persist(&checkpoint).await?;
        Ok(checkpoint)
    }

    /// Move to a new phase and make the boundary durable
    async fn enter(&mut self, state: ImportState) -> Result<(), EngineError> {
        let transition = self.session.transition_to(state);
        info!(
            session_id = %self.session.session_id,
            from = transition.old_state.as_str(),
            to = transition.new_state.as_str(),
            "Import phase transition"
        );
        self.persist_checkpoint().await?;
        Ok(())
    }

    /// Current statistics and errors as a caller-facing result
    pub fn result(&self) -> ImportResult {
        ImportResult {
            session_id: self.session.session_id,
            state: self.session.state,
            completed: self.session.state == ImportState::Completed,
            statistics: self.session.statistics.clone(),
            errors: self.session.errors.clone(),
            duration_ms: self.session.elapsed_ms,
        }
    }

    /// Run until the limits are reached or the session ends
    pub async fn run_batch(&mut self, limits: BatchLimits) -> Result<StepOutcome, EngineError> {
        if self.session.is_terminal() {
            return Ok(StepOutcome::Finished(self.result()));
        }

        let mut clock = BatchClock::new(limits);
        self.session.batches += 1;

        let interrupt = self.run_phases(&mut clock).await?;
        self.session.elapsed_ms += clock.elapsed_ms();

        match interrupt {
            None => {
                self.enter(ImportState::Completed).await?;
                // Nothing left to resume
                self.sink.discard(self.session.session_id).await?;
                let result = self.result();
                info!(
                    session_id = %self.session.session_id,
                    entities = result.statistics.total_entities(),
                    errors = result.errors.len(),
                    duration_ms = result.duration_ms,
                    "Import completed"
                );
                Ok(StepOutcome::Finished(result))
            }
            Some(Interrupt::Suspend) => {
                let checkpoint = self.persist_checkpoint().await?;
                info!(
                    session_id = %self.session.session_id,
                    state = self.session.state.as_str(),
                    byte_offset = self.session.byte_offset,
                    handled = clock.handled,
                    "Import batch suspended"
                );
                Ok(StepOutcome::Suspended(checkpoint))
            }
            Some(Interrupt::Fatal(cause)) => {
                error!(
                    session_id = %self.session.session_id,
                    state = self.session.state.as_str(),
                    error = %cause,
                    "Import failed"
                );
                let code = match cause {
                    StoreError::Unavailable(_) => error_codes::STORE_UNAVAILABLE,
                    StoreError::Transient(_) => error_codes::WRITE_RETRIES_EXHAUSTED,
                    StoreError::Rejected(_) => error_codes::WRITE_FAILED,
                };
                self.session
                    .add_error(ImportError::fatal(None, code, cause.to_string()));
                self.enter(ImportState::Failed).await?;
                Ok(StepOutcome::Finished(self.result()))
            }
        }
    }

    /// Run batches until the session ends
    pub async fn run_to_completion(&mut self, limits: BatchLimits) -> Result<ImportResult, EngineError> {
        loop {
            if let StepOutcome::Finished(result) = self.run_batch(limits).await? {
                return Ok(result);
            }
        }
    }

    /// Stop the session for good and discard its checkpoint
    pub async fn abort(&mut self) -> Result<ImportResult, EngineError> {
        if self.session.is_terminal() {
            return Err(EngineError::InvalidState {
                session_id: self.session.session_id,
                state: self.session.state,
            });
        }
        self.session.transition_to(ImportState::Cancelled);
        self.sink.discard(self.session.session_id).await?;
        info!(session_id = %self.session.session_id, "Import cancelled");
        Ok(self.result())
    }

    /// Walk the phases from the current state
    ///
    /// Returns None when every phase is done.
    async fn run_phases(&mut self, clock: &mut BatchClock) -> Result<Option<Interrupt>, EngineError> {
        loop {
            match self.session.state {
                ImportState::Idle => {
                    self.enter(ImportState::Parsing).await?;
                }
                ImportState::Parsing => {
                    if let Some(interrupt) = self.phase_parsing(clock).await? {
                        return Ok(Some(interrupt));
                    }
                    self.enter(ImportState::Resolving).await?;
                }
                ImportState::Resolving => {
                    self.phase_resolving();
                    self.enter(ImportState::Persisting).await?;
                }
                ImportState::Persisting => {
                    if let Some(interrupt) = self.phase_persisting(clock).await? {
                        return Ok(Some(interrupt));
                    }
                    return Ok(None);
                }
                ImportState::Completed | ImportState::Failed | ImportState::Cancelled => {
                    return Ok(None);
                }
            }
        }
    }
}

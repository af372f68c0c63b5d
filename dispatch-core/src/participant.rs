//! The Saga Participant contract and the pending/current adapter slot every participant
//! keeps its state behind (spec §4.6).

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::{error::AnyResult, transaction::Transaction};

/// `NotStarted -> Preparing -> Prepared -> Applying -> Applied`, with `Compensating ->
/// Compensated` as the rollback branch out of `Prepared`, and `Errored` as the terminal
/// error sink (spec §4.6). Read via an atomic so `State()` never blocks on a participant's
/// own work mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    NotStarted,
    Preparing,
    Prepared,
    Applying,
    Applied,
    Compensating,
    Compensated,
    Errored,
}

impl std::fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParticipantState::NotStarted => "NotStarted",
            ParticipantState::Preparing => "Preparing",
            ParticipantState::Prepared => "Prepared",
            ParticipantState::Applying => "Applying",
            ParticipantState::Applied => "Applied",
            ParticipantState::Compensating => "Compensating",
            ParticipantState::Compensated => "Compensated",
            ParticipantState::Errored => "Errored",
        };
        f.write_str(s)
    }
}

/// A component that owns mutable state derived from a configuration snapshot and
/// participates in the saga.
///
/// `Apply` is called at most once per `Prepare`, `Compensate` at most once; a participant
/// that reaches `Errored` must not be targeted by a later transaction until the coordinator
/// has observed and acknowledged the error (enforced by the coordinator, not here).
#[async_trait::async_trait]
pub trait Participant: Send + Sync {
    /// Stable name used for both sort-order and history reporting (spec §4.7: participants
    /// are driven in sorted name order).
    fn name(&self) -> &str;

    /// Validates `tx.snapshot` for this participant's concern, compiles it into the
    /// participant's adapter type, and stores it pending. Must not mutate any externally
    /// visible state.
    async fn prepare(&self, ctx: &CancellationToken, tx: &Transaction) -> AnyResult<()>;

    /// Atomically commits the pending adapter to current and triggers external
    /// reconciliation. After returning, readers must observe the new state.
    async fn apply(&self, ctx: &CancellationToken) -> AnyResult<()>;

    /// Discards the pending adapter; the participant becomes indistinguishable from before
    /// `Prepare`.
    async fn compensate(&self, ctx: &CancellationToken, tx: &Transaction) -> AnyResult<()>;

    fn state(&self) -> ParticipantState;
}

struct SlotInner<A> {
    current: Option<Arc<A>>,
    pending: Option<Arc<A>>,
}

impl<A> Default for SlotInner<A> {
    fn default() -> Self {
        Self {
            current: None,
            pending: None,
        }
    }
}

/// `(current_adapter?, pending_adapter?)` (spec §4.6). At most one pending adapter at a
/// time; setting a new one silently discards whatever was pending.
pub struct ParticipantSlot<A> {
    inner: Mutex<SlotInner<A>>,
}

impl<A> Default for ParticipantSlot<A> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(SlotInner::default()),
        }
    }
}

impl<A> ParticipantSlot<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<A>> {
        self.inner.lock().unwrap().current.clone()
    }

    pub fn pending(&self) -> Option<Arc<A>> {
        self.inner.lock().unwrap().pending.clone()
    }

    pub fn set_pending(&self, adapter: A) {
        self.inner.lock().unwrap().pending = Some(Arc::new(adapter));
    }

    /// Moves pending to current, returning the newly current adapter. A no-op `None` when
    /// nothing was pending.
    pub fn commit_pending(&self) -> Option<Arc<A>> {
        let mut inner = self.inner.lock().unwrap();
        let adapter = inner.pending.take()?;
        inner.current = Some(adapter.clone());
        Some(adapter)
    }

    pub fn discard_pending(&self) {
        self.inner.lock().unwrap().pending = None;
    }
}

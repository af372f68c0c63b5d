//! The saga participant wrapping the Listener Fleet Manager (spec §4.6).

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use dispatch_core::{
    bail_into,
    participant::{Participant, ParticipantSlot, ParticipantState},
    registry::validate_snapshot,
    transaction::Transaction,
    AnyResult,
};
use tokio_util::sync::CancellationToken;

use crate::fleet::{http_adapter_from_snapshot, FleetManager, HttpAdapter};

/// Prepares an [`HttpAdapter`] from the transaction's snapshot and, on `Apply`, drives the
/// [`FleetManager`] to reconcile the live listener set to match it.
pub struct FleetParticipant {
    manager: Arc<FleetManager>,
    slot: ParticipantSlot<HttpAdapter>,
    state: AtomicU8,
}

impl FleetParticipant {
    pub fn new(manager: Arc<FleetManager>) -> Self {
        Self {
            manager,
            slot: ParticipantSlot::new(),
            state: AtomicU8::new(ParticipantState::NotStarted as u8),
        }
    }

    fn set_state(&self, s: ParticipantState) {
        self.state.store(s as u8, Ordering::Release);
    }
}

#[async_trait::async_trait]
impl Participant for FleetParticipant {
    fn name(&self) -> &str {
        "fleet"
    }

    async fn prepare(&self, _ctx: &CancellationToken, tx: &Transaction) -> AnyResult<()> {
        self.set_state(ParticipantState::Preparing);
        validate_snapshot(&tx.snapshot)?;
        let adapter = http_adapter_from_snapshot(&tx.snapshot);
        self.slot.set_pending(adapter);
        self.set_state(ParticipantState::Prepared);
        Ok(())
    }

    async fn apply(&self, _ctx: &CancellationToken) -> AnyResult<()> {
        self.set_state(ParticipantState::Applying);
        let Some(adapter) = self.slot.commit_pending() else {
            bail_into!("fleet participant applied with no pending adapter");
        };
        self.manager.reconcile((*adapter).clone()).await?;
        self.set_state(ParticipantState::Applied);
        Ok(())
    }

    async fn compensate(&self, _ctx: &CancellationToken, _tx: &Transaction) -> AnyResult<()> {
        self.set_state(ParticipantState::Compensating);
        self.slot.discard_pending();
        self.set_state(ParticipantState::Compensated);
        Ok(())
    }

    fn state(&self) -> ParticipantState {
        match self.state.load(Ordering::Acquire) {
            0 => ParticipantState::NotStarted,
            1 => ParticipantState::Preparing,
            2 => ParticipantState::Prepared,
            3 => ParticipantState::Applying,
            4 => ParticipantState::Applied,
            5 => ParticipantState::Compensating,
            6 => ParticipantState::Compensated,
            _ => ParticipantState::Errored,
        }
    }
}

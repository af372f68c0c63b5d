//! The saga participant wrapping the Routing Registry (spec §4.6).

use std::sync::{atomic::{AtomicU8, Ordering}, Arc};

use dispatch_core::{
    bail_into,
    participant::{Participant, ParticipantSlot, ParticipantState},
    registry::{validate_snapshot, RoutingRegistry},
    route::RouteTable,
    transaction::Transaction,
    AnyResult,
};
use tokio_util::sync::CancellationToken;

use crate::apps;

/// Prepares a [`RouteTable`] from the transaction's snapshot and, on `Apply`, installs it
/// into the shared [`RoutingRegistry`].
pub struct RoutingParticipant {
    registry: Arc<RoutingRegistry>,
    slot: ParticipantSlot<RouteTable>,
    state: AtomicU8,
}

impl RoutingParticipant {
    pub fn new(registry: Arc<RoutingRegistry>) -> Self {
        Self {
            registry,
            slot: ParticipantSlot::new(),
            state: AtomicU8::new(ParticipantState::NotStarted as u8),
        }
    }

    fn set_state(&self, s: ParticipantState) {
        self.state.store(s as u8, Ordering::Release);
    }
}

#[async_trait::async_trait]
impl Participant for RoutingParticipant {
    fn name(&self) -> &str {
        "routing"
    }

    async fn prepare(&self, _ctx: &CancellationToken, tx: &Transaction) -> AnyResult<()> {
        self.set_state(ParticipantState::Preparing);
        validate_snapshot(&tx.snapshot)?;
        let apps = apps::build(&tx.snapshot)?;
        let table = RouteTable::compile(&tx.snapshot, &apps)?;
        self.slot.set_pending(table);
        self.set_state(ParticipantState::Prepared);
        Ok(())
    }

    async fn apply(&self, _ctx: &CancellationToken) -> AnyResult<()> {
        self.set_state(ParticipantState::Applying);
        let Some(table) = self.slot.commit_pending() else {
            bail_into!("routing participant applied with no pending route table");
        };
        self.registry.install(table);
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

//! The transaction value type the coordinator drives through its lifecycle (spec §3, §4.7).

use std::{collections::HashMap, time::SystemTime};

use crate::{ids::TxId, participant::ParticipantState, snapshot::ConfigSnapshot};

/// `Pending -> Validated -> Executing -> Succeeded -> Reloading -> Completed`, with an error
/// path out of any non-terminal state into `Failed`, and a distinct `Degraded` terminal for
/// partial Apply failure (spec §4.7, §7): participants that already committed are not rolled
/// back, so the transaction is neither clean nor fully reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Validated,
    Executing,
    Succeeded,
    Reloading,
    Completed,
    Failed,
    Degraded,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Completed | TxState::Failed | TxState::Degraded)
    }
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TxState::Pending => "Pending",
            TxState::Validated => "Validated",
            TxState::Executing => "Executing",
            TxState::Succeeded => "Succeeded",
            TxState::Reloading => "Reloading",
            TxState::Completed => "Completed",
            TxState::Failed => "Failed",
            TxState::Degraded => "Degraded",
        };
        f.write_str(s)
    }
}

/// One configuration change as it moves through the saga (spec §3).
#[derive(Debug, Clone)]
pub struct Transaction {
    pub tx_id: TxId,
    pub snapshot: ConfigSnapshot,
    pub state: TxState,
    pub created_at: SystemTime,
    pub error: Option<String>,
    pub per_participant_state: HashMap<String, ParticipantState>,
}

impl Transaction {
    pub fn new(tx_id: TxId, snapshot: ConfigSnapshot) -> Self {
        Self {
            tx_id,
            snapshot,
            state: TxState::Pending,
            created_at: SystemTime::now(),
            error: None,
            per_participant_state: HashMap::new(),
        }
    }

    pub fn fail(&mut self, cause: impl std::fmt::Display) {
        self.state = TxState::Failed;
        self.error = Some(cause.to_string());
    }

    pub fn degrade(&mut self, cause: impl std::fmt::Display) {
        self.state = TxState::Degraded;
        self.error = Some(cause.to_string());
    }
}

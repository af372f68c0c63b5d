//! The Transaction Coordinator: drives a snapshot through the saga lifecycle across an
//! ordered set of participants and retains a bounded history (spec §4.7).

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use dispatch_core::{
    ids::TxId,
    participant::Participant,
    registry::validate_snapshot,
    snapshot::ConfigSnapshot,
    transaction::{Transaction, TxState},
};
use tokio_util::sync::CancellationToken;

/// Default bound on inter-participant settle waits during Apply (spec §4.7: "a handful of
/// seconds").
const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(5);
/// Default poll interval while waiting for a participant to settle ("hundreds of ms").
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);
/// Default history depth (spec §4.7).
const DEFAULT_HISTORY_CAP: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(#[source] anyhow::Error),
    #[error("prepare failed on participant {participant}: {cause}")]
    PrepareFailed {
        participant: String,
        #[source]
        cause: anyhow::Error,
    },
    #[error("apply degraded on participant {participant}: {cause}")]
    ApplyDegraded {
        participant: String,
        #[source]
        cause: anyhow::Error,
    },
    #[error("submission cancelled")]
    Cancelled,
}

/// Owns the ordered participant list and the bounded transaction history. Submissions are
/// serialized through a single async mutex: only one transaction is in flight at a time,
/// and callers are unblocked only once their own transaction reaches a terminal state
/// (spec §4.7's single work queue).
pub struct Coordinator {
    participants: Vec<Arc<dyn Participant>>,
    queue: tokio::sync::Mutex<()>,
    next_tx_id: AtomicU64,
    history: Mutex<VecDeque<Transaction>>,
    history_cap: usize,
    current: Mutex<Option<Transaction>>,
    reload_timeout: Duration,
    retry_interval: Duration,
    state: tokio::sync::watch::Sender<&'static str>,
}

impl Coordinator {
    /// Participants are sorted by name once at construction; that order governs both
    /// Prepare/Apply/Compensate traversal (spec §5: deterministic sort order by name).
    pub fn new(mut participants: Vec<Arc<dyn Participant>>) -> Self {
        participants.sort_by(|a, b| a.name().cmp(b.name()));
        let (state, _) = tokio::sync::watch::channel("Idle");
        Self {
            participants,
            queue: tokio::sync::Mutex::new(()),
            next_tx_id: AtomicU64::new(1),
            history: Mutex::new(VecDeque::new()),
            history_cap: DEFAULT_HISTORY_CAP,
            current: Mutex::new(None),
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            state,
        }
    }

    pub fn current(&self) -> Option<Transaction> {
        self.current.lock().unwrap().clone()
    }

    /// Observational state of the most recently finished transaction (spec §6 `State()`),
    /// `"Idle"` before any submission.
    pub fn state(&self) -> &'static str {
        *self.state.borrow()
    }

    /// `StateChanges(ctx)` (spec §6).
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<&'static str> {
        self.state.subscribe()
    }

    /// Newest first, capped at `history_cap` (spec §4.7).
    pub fn history(&self) -> Vec<Transaction> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    pub async fn submit(&self, snapshot: ConfigSnapshot) -> Result<TxId, SubmitError> {
        self.submit_with_cancellation(snapshot, CancellationToken::new()).await
    }

    pub async fn submit_with_cancellation(
        &self,
        snapshot: ConfigSnapshot,
        ctx: CancellationToken,
    ) -> Result<TxId, SubmitError> {
        let _serialize = self.queue.lock().await;

        let tx_id = TxId(self.next_tx_id.fetch_add(1, Ordering::Relaxed));
        let mut tx = Transaction::new(tx_id, snapshot);

        tx.state = TxState::Validated;
        if ctx.is_cancelled() {
            tx.fail("submission cancelled before validation");
            self.finish(tx);
            return Err(SubmitError::Cancelled);
        }
        if let Err(e) = validate_snapshot(&tx.snapshot) {
            tx.fail(format!("configuration invalid: {e}"));
            self.finish(tx);
            return Err(SubmitError::ConfigInvalid(e.into()));
        }

        tx.state = TxState::Executing;
        let mut prepared: Vec<&Arc<dyn Participant>> = Vec::with_capacity(self.participants.len());
        let mut prepare_err: Option<(String, anyhow::Error)> = None;
        for participant in &self.participants {
            if ctx.is_cancelled() {
                prepare_err = Some((participant.name().to_string(), anyhow::anyhow!("cancelled")));
                break;
            }
            match participant.prepare(&ctx, &tx).await {
                Ok(()) => prepared.push(participant),
                Err(e) => {
                    prepare_err = Some((participant.name().to_string(), e));
                    break;
                }
            }
        }

        if let Some((name, cause)) = prepare_err {
            for participant in prepared.iter().rev() {
                if let Err(e) = participant.compensate(&ctx, &tx).await {
                    tracing::error!(participant = participant.name(), error = %e, "compensate failed");
                }
            }
            tx.fail(format!("prepare failed on {name}: {cause}"));
            self.finish(tx);
            return Err(SubmitError::PrepareFailed { participant: name, cause });
        }

        tx.state = TxState::Succeeded;
        tx.state = TxState::Reloading;

        let mut degraded: Option<(String, anyhow::Error)> = None;
        for participant in &self.participants {
            if let Err(e) = participant.apply(&ctx).await {
                tracing::error!(participant = participant.name(), error = %e, "apply degraded, continuing");
                degraded.get_or_insert((participant.name().to_string(), e));
                continue;
            }
            if let Err(e) = self.wait_for_settle(participant.as_ref(), &ctx).await {
                tracing::error!(participant = participant.name(), error = %e, "participant did not settle in time");
                degraded.get_or_insert((participant.name().to_string(), e));
            }
        }

        let result = match degraded {
            None => {
                tx.state = TxState::Completed;
                Ok(tx_id)
            }
            Some((name, cause)) => {
                tx.degrade(format!("apply degraded on {name}: {cause}"));
                Err(SubmitError::ApplyDegraded { participant: name, cause })
            }
        };

        self.current.lock().unwrap().replace(tx.clone());
        self.finish(tx);
        result
    }

    /// Waits up to `reload_timeout`, polling every `retry_interval`, for a participant to
    /// observably settle into `Applied` after its own `apply` returned (spec §4.7).
    async fn wait_for_settle(&self, participant: &dyn Participant, ctx: &CancellationToken) -> anyhow::Result<()> {
        use dispatch_core::participant::ParticipantState;

        let deadline = tokio::time::Instant::now() + self.reload_timeout;
        loop {
            match participant.state() {
                ParticipantState::Applied => return Ok(()),
                ParticipantState::Errored => {
                    anyhow::bail!("participant {} entered Errored state", participant.name())
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("participant {} did not reach Applied within reload_timeout", participant.name());
            }
            tokio::select! {
                _ = ctx.cancelled() => anyhow::bail!("cancelled while waiting for {} to settle", participant.name()),
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    fn finish(&self, tx: Transaction) {
        let _ = self.state.send(match tx.state {
            TxState::Completed => "Completed",
            TxState::Failed => "Failed",
            TxState::Degraded => "Degraded",
            _ => "Unknown",
        });
        let mut history = self.history.lock().unwrap();
        history.push_front(tx);
        while history.len() > self.history_cap {
            history.pop_back();
        }
    }
}

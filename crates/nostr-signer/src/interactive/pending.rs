//! Ticket-keyed table of interactive calls awaiting an outcome.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{ActivityOutcome, INTERACTIVE_TARGET};
use crate::catalog::OperationKind;
use crate::error::SignerError;

/// Progress of the interactive channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// No call is in flight.
    Idle,
    /// A call is reserved and the signer is being launched.
    Launching,
    /// The signer is open and the caller waits for its outcome.
    AwaitingResult,
}

/// What happened to an outcome handed to [`PendingCalls::deliver`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The outcome resumed the waiting caller.
    Resolved,
    /// No caller was waiting; the outcome was discarded.
    Mismatched,
}

#[derive(Debug)]
struct PendingEntry {
    kind: OperationKind,
    phase: CallPhase,
    sender: oneshot::Sender<ActivityOutcome>,
}

#[derive(Debug, Default)]
struct PendingTable {
    next_ticket: u64,
    entries: BTreeMap<u64, PendingEntry>,
}

/// Shared handle on the calls awaiting a signer outcome.
///
/// Clones share the same table. The host keeps one clone to feed activity
/// outcomes back through [`PendingCalls::deliver`].
#[derive(Debug, Clone, Default)]
pub struct PendingCalls {
    table: Arc<Mutex<PendingTable>>,
}

impl PendingCalls {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current phase of the channel.
    #[must_use]
    pub fn phase(&self) -> CallPhase {
        self.lock()
            .entries
            .values()
            .next()
            .map_or(CallPhase::Idle, |entry| entry.phase)
    }

    /// Returns the kind of the call in flight, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<OperationKind> {
        self.lock().entries.values().next().map(|entry| entry.kind)
    }

    /// Routes an activity outcome to the waiting caller.
    ///
    /// Outcomes that arrive while no call is pending, or after the caller
    /// gave up, are discarded and reported as [`Delivery::Mismatched`].
    pub fn deliver(&self, outcome: ActivityOutcome) -> Delivery {
        let entry = {
            let mut table = self.lock();
            table.entries.pop_first()
        };
        let Some((ticket, entry)) = entry else {
            warn!(
                target: INTERACTIVE_TARGET,
                code = ?outcome.code(),
                "discarding activity outcome with no pending call"
            );
            return Delivery::Mismatched;
        };

        let kind = entry.kind;
        if entry.sender.send(outcome).is_err() {
            warn!(
                target: INTERACTIVE_TARGET,
                %kind,
                ticket,
                "caller stopped waiting before the outcome arrived"
            );
            return Delivery::Mismatched;
        }
        debug!(target: INTERACTIVE_TARGET, %kind, ticket, "activity outcome delivered");
        Delivery::Resolved
    }

    /// Reserves the single in-flight slot for a call of `kind`.
    pub(super) fn reserve(
        &self,
        kind: OperationKind,
    ) -> Result<(PendingGuard, oneshot::Receiver<ActivityOutcome>), SignerError> {
        let mut table = self.lock();
        if let Some(busy) = table.entries.values().next() {
            debug!(
                target: INTERACTIVE_TARGET,
                requested = %kind,
                in_flight = %busy.kind,
                "interactive channel busy"
            );
            return Err(SignerError::ChannelBusy);
        }

        let ticket = table.next_ticket;
        table.next_ticket = table.next_ticket.wrapping_add(1);
        let (sender, receiver) = oneshot::channel();
        table.entries.insert(
            ticket,
            PendingEntry {
                kind,
                phase: CallPhase::Launching,
                sender,
            },
        );
        drop(table);

        let guard = PendingGuard {
            calls: self.clone(),
            ticket,
        };
        Ok((guard, receiver))
    }

    fn set_phase(&self, ticket: u64, phase: CallPhase) {
        if let Some(entry) = self.lock().entries.get_mut(&ticket) {
            entry.phase = phase;
        }
    }

    fn release(&self, ticket: u64) {
        if self.lock().entries.remove(&ticket).is_some() {
            debug!(target: INTERACTIVE_TARGET, ticket, "released pending call");
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one reserved slot and releases it when dropped.
#[derive(Debug)]
pub(super) struct PendingGuard {
    calls: PendingCalls,
    ticket: u64,
}

impl PendingGuard {
    pub(super) const fn ticket(&self) -> u64 {
        self.ticket
    }

    pub(super) fn awaiting_result(&self) {
        self.calls.set_phase(self.ticket, CallPhase::AwaitingResult);
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.calls.release(self.ticket);
    }
}

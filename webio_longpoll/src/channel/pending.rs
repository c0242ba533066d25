//! The single pending-poll slot.

use tokio_util::sync::CancellationToken;

/// Observable state of the receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    /// Not started yet, or shut down.
    Stopped,

    /// Started, between cycles (a completed cycle is dispatching, or the
    /// host's ready signal has not fired yet).
    Idle,

    /// A cycle is waiting out the startup delay or a retry delay.
    Scheduled,

    /// A `/recv` request is outstanding.
    InFlight,
}

/// The one cycle allowed to be live at a time.
///
/// A new cycle replaces the slot and cancels the token of whatever it
/// replaced. A cycle only dispatches if it still owns the slot when its
/// request completes.
#[derive(Debug)]
pub(super) struct PendingPoll {
    pub(super) generation: u64,
    pub(super) cancel: CancellationToken,
    pub(super) state: PollState,
}

impl PendingPoll {
    pub(super) fn new(generation: u64, cancel: CancellationToken, delayed: bool) -> Self {
        Self {
            generation,
            cancel,
            state: if delayed {
                PollState::Scheduled
            } else {
                PollState::InFlight
            },
        }
    }

    /// Whether the cycle numbered `generation` is still the live one.
    pub(super) fn is_owned_by(&self, generation: u64) -> bool {
        self.generation == generation && !self.cancel.is_cancelled()
    }
}

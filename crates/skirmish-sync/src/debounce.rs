//! Debounced broadcast scheduling.
//!
//! A two-state machine, idle or pending-with-deadline, instead of a
//! bare timer handle: every touch restarts the window, and the caller
//! snapshots state at fire time, so the last mutation in a burst always
//! wins.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Pending { deadline: Instant },
}

#[derive(Debug)]
pub struct BroadcastDebounce {
    window: Duration,
    phase: Phase,
}

impl BroadcastDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            phase: Phase::Idle,
        }
    }

    /// Record a mutation at `now`, restarting the window.
    pub fn touch(&mut self, now: Instant) {
        self.phase = Phase::Pending {
            deadline: now + self.window,
        };
    }

    /// Deadline of the pending broadcast, if one is scheduled.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Pending { deadline } => Some(deadline),
        }
    }

    /// True when a pending broadcast is due at `now`; resets to idle.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Pending { deadline } if now >= deadline => {
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Pending { .. })
    }
}

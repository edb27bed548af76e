//! Leading/trailing-edge poll throttle.
//!
//! A trigger runs immediately when the window since the last run has
//! elapsed. Otherwise one trailing run is scheduled at the end of the
//! window; further triggers before it fires are absorbed into it.

use std::time::Duration;
use tokio::time::Instant;

/// What the caller should do with a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Run now.
    RunNow,
    /// A trailing run was scheduled for this instant.
    Scheduled(Instant),
    /// A trailing run is already pending.
    AlreadyScheduled,
}

/// Per-connection throttle state.
#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last_run: Option<Instant>,
    pending: Option<Instant>,
}

impl Throttle {
    /// Creates a throttle with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_run: None,
            pending: None,
        }
    }

    /// Registers a trigger at `now`.
    pub fn request(&mut self, now: Instant) -> ThrottleDecision {
        if self.pending.is_some() {
            return ThrottleDecision::AlreadyScheduled;
        }
        match self.last_run {
            Some(last) if now < last + self.window => {
                let at = last + self.window;
                self.pending = Some(at);
                ThrottleDecision::Scheduled(at)
            }
            _ => ThrottleDecision::RunNow,
        }
    }

    /// Records that a run happened at `now`. Any pending trailing run is
    /// satisfied by it.
    pub fn record_run(&mut self, now: Instant) {
        self.last_run = Some(now);
        self.pending = None;
    }

    /// Returns when the pending trailing run is due.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    /// Returns the window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

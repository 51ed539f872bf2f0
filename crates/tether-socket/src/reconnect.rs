//! Reconnect scheduling.
//!
//! One [`ReconnectPolicy`] is owned by the session task. It allows a single
//! pending reconnect at a time, counts attempts against the budget and hands
//! out `min(initial * 2^k, max)` delays. Attempts and delay reset only after
//! a successful open.

use std::time::Duration;

use tether_core::calculate_backoff_delay;

/// Outcome of [`ReconnectPolicy::schedule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`; this is attempt number `attempt` (1-based).
    Scheduled {
        /// Attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// A reconnect is already pending.
    AlreadyScheduled,
    /// The attempt budget is spent.
    Exhausted,
    /// Reconnects were disabled.
    Disabled,
}

/// Attempt counter and backoff state for one session.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempts: u32,
    current_delay: Duration,
    pending: bool,
    disabled: bool,
}

impl ReconnectPolicy {
    /// Create a policy.
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            attempts: 0,
            current_delay: initial_delay,
            pending: false,
            disabled: false,
        }
    }

    /// Reserve the next reconnect.
    #[allow(clippy::cast_possible_truncation)]
    pub fn schedule(&mut self) -> ReconnectDecision {
        if self.disabled {
            return ReconnectDecision::Disabled;
        }
        if self.pending {
            return ReconnectDecision::AlreadyScheduled;
        }
        if self.attempts >= self.max_attempts {
            return ReconnectDecision::Exhausted;
        }

        let delay = Duration::from_millis(calculate_backoff_delay(
            self.attempts,
            self.initial_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        ));
        self.attempts += 1;
        self.current_delay = delay;
        self.pending = true;
        ReconnectDecision::Scheduled {
            attempt: self.attempts,
            delay,
        }
    }

    /// The pending reconnect is starting now.
    pub fn fire(&mut self) {
        self.pending = false;
    }

    /// A connection opened: clear attempts and delay.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.initial_delay;
        self.pending = false;
    }

    /// Refuse all future reconnects.
    pub fn disable(&mut self) {
        self.disabled = true;
        self.pending = false;
    }

    /// Reconnects attempted since the last open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay of the latest scheduled reconnect, or the initial delay.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Whether a reconnect is pending.
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Link status and the debounce rule for connectivity flips.
//!
//! Flips toward Connected always apply. Flips away from Connected:
//!
//! - transport close/failure: apply immediately;
//! - local teardown (`disconnect`, `force_disconnect`, reconnect cycles):
//!   apply immediately;
//! - liveness signals: defer until enough consecutive checks failed and the
//!   cooldown since the previous flip has passed. A missed pong is then
//!   applied; a rejected ping write first gets one probe write.

use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// The negative liveness evidence behind a disconnect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessSignal {
    /// The socket refused the heartbeat ping.
    SendRejected,
    /// A ping went unanswered past the pong timeout.
    PongMissed,
}

/// Where a disconnect request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipOrigin {
    Transport,
    Local,
    Liveness(LivenessSignal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDecision {
    Apply,
    Defer,
    /// Write a `connection_test` frame; disconnect only if it is refused.
    ProbeFirst,
}

#[derive(Debug, Clone)]
pub struct StateGate {
    cooldown: Duration,
    required_failed_checks: u32,
    last_flip_at: Option<Instant>,
}

impl StateGate {
    pub fn new(cooldown: Duration, required_failed_checks: u32) -> Self {
        Self {
            cooldown,
            required_failed_checks,
            last_flip_at: None,
        }
    }

    /// Decide on a request to leave Connected.
    pub fn decide_disconnect(&self, origin: FlipOrigin, failed_checks: u32, now: Instant) -> FlipDecision {
        let FlipOrigin::Liveness(signal) = origin else {
            return FlipDecision::Apply;
        };
        if failed_checks < self.required_failed_checks || self.in_cooldown(now) {
            return FlipDecision::Defer;
        }
        match signal {
            LivenessSignal::SendRejected => FlipDecision::ProbeFirst,
            LivenessSignal::PongMissed => FlipDecision::Apply,
        }
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.last_flip_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.cooldown)
    }

    pub fn record_flip(&mut self, at: Instant) {
        self.last_flip_at = Some(at);
    }
}

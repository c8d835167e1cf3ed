//! Heartbeat bookkeeping.
//!
//! The controller owns the timers; this type only records what was sent and
//! received and answers whether a given ping has been resolved. Pongs are
//! matched to pings by timestamp: a pong resolves every ping sent at or
//! before its effective timestamp.

use devlink_api::OutboundFrame;
use tokio::time::Instant;

/// Result of feeding a pong to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PongOutcome {
    /// The pong answers the latest ping (or no ping is outstanding).
    Accepted,
    /// The pong predates the latest ping and resolves nothing.
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct HeartbeatMonitor {
    last_ping_sent_at: Option<i64>,
    last_pong_ts: Option<i64>,
    last_pong_received_at: Option<Instant>,
    consecutive_failed_checks: u32,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the ping for `now_ms` and remember it as the latest one sent.
    pub fn ping(&mut self, device_id: &str, now_ms: i64) -> OutboundFrame {
        self.last_ping_sent_at = Some(now_ms);
        OutboundFrame::ping(device_id, now_ms)
    }

    /// Same as [`ping`](Self::ping) but flagged as an explicit verification.
    pub fn verify_ping(&mut self, device_id: &str, now_ms: i64) -> OutboundFrame {
        self.last_ping_sent_at = Some(now_ms);
        OutboundFrame::verify_ping(device_id, now_ms)
    }

    /// Feed a pong whose effective timestamp is `pong_ts`.
    pub fn record_pong(&mut self, pong_ts: i64, received_at: Instant) -> PongOutcome {
        if self.last_ping_sent_at.is_some_and(|sent| pong_ts < sent) {
            return PongOutcome::Stale;
        }
        self.last_pong_ts = Some(pong_ts);
        self.last_pong_received_at = Some(received_at);
        self.consecutive_failed_checks = 0;
        PongOutcome::Accepted
    }

    /// Whether a pong resolving the ping sent at `sent_at` has arrived.
    pub fn is_answered(&self, sent_at: i64) -> bool {
        self.last_pong_ts.is_some_and(|pong| pong >= sent_at)
    }

    /// Count one negative liveness signal. Returns the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failed_checks = self.consecutive_failed_checks.saturating_add(1);
        self.consecutive_failed_checks
    }

    pub fn consecutive_failed_checks(&self) -> u32 {
        self.consecutive_failed_checks
    }

    pub fn last_pong_received_at(&self) -> Option<Instant> {
        self.last_pong_received_at
    }

    pub fn last_ping_sent_at(&self) -> Option<i64> {
        self.last_ping_sent_at
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failed_checks = 0;
    }

    /// Forget everything; used when a session ends or a new one begins.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_after_ping_resolves_it() {
        let mut hb = HeartbeatMonitor::new();
        hb.ping("042", 1_000);
        hb.record_failure();

        assert_eq!(hb.record_pong(1_000, Instant::now()), PongOutcome::Accepted);
        assert!(hb.is_answered(1_000));
        assert_eq!(hb.consecutive_failed_checks(), 0);
        assert!(hb.last_pong_received_at().is_some());
    }

    #[test]
    fn stale_pong_leaves_counter_untouched() {
        let mut hb = HeartbeatMonitor::new();
        hb.ping("042", 1_000);
        hb.record_failure();
        hb.ping("042", 2_000);

        assert_eq!(hb.record_pong(1_500, Instant::now()), PongOutcome::Stale);
        assert_eq!(hb.consecutive_failed_checks(), 1);
        assert!(!hb.is_answered(2_000));
        assert!(hb.last_pong_received_at().is_none());
    }

    #[test]
    fn unsolicited_pong_is_accepted() {
        let mut hb = HeartbeatMonitor::new();
        assert_eq!(hb.record_pong(10, Instant::now()), PongOutcome::Accepted);
    }

    #[test]
    fn newer_pong_answers_older_pings() {
        let mut hb = HeartbeatMonitor::new();
        hb.ping("042", 100);
        hb.record_pong(250, Instant::now());
        assert!(hb.is_answered(100));
        assert!(hb.is_answered(250));
        assert!(!hb.is_answered(251));
    }

    #[test]
    fn reset_clears_everything() {
        let mut hb = HeartbeatMonitor::new();
        hb.ping("042", 5);
        hb.record_failure();
        hb.reset();
        assert_eq!(hb.consecutive_failed_checks(), 0);
        assert!(hb.last_ping_sent_at().is_none());
    }

    #[test]
    fn ping_frame_carries_device_and_timestamp() {
        let mut hb = HeartbeatMonitor::new();
        let frame = hb.ping("042", 77);
        assert_eq!(frame, OutboundFrame::ping("042", 77));
        assert_eq!(hb.last_ping_sent_at(), Some(77));
    }
}

//! Wall-clock milliseconds for wire timestamps.
//!
//! Anchored to the system clock once, then advanced with tokio's monotonic
//! clock, so paused-time tests see timestamps move with `advance()` and a
//! system clock step never makes pings look older than earlier ones.

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct LinkClock {
    anchor_ms: i64,
    anchor: Instant,
}

impl LinkClock {
    pub fn new() -> Self {
        Self::anchored_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn anchored_at(anchor_ms: i64) -> Self {
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }

    /// Epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.anchor_ms.saturating_add(elapsed)
    }
}

impl Default for LinkClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn follows_tokio_time() {
        let clock = LinkClock::anchored_at(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(clock.now_ms(), 2_500);
    }

    #[test]
    fn anchors_near_system_time() {
        let before = chrono::Utc::now().timestamp_millis();
        let now = LinkClock::new().now_ms();
        assert!(now >= before);
    }
}

// ── Runtime link configuration ──
//
// Tunables for one controller instance. Core never reads config files;
// devlink-config (or a test) builds a `LinkConfig` and hands it in.

use std::time::Duration;

use devlink_api::{ChannelConfig, ServerEndpoint};

use crate::reconnect::BackoffStrategy;

/// Default trigger phrase that requests a network toggle ("please switch network").
pub const DEFAULT_TRIGGER_PHRASE: &str = "请切换网络";

/// Heartbeat timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Period between pings while connected. Default: 20s.
    pub interval: Duration,
    /// How long a ping may go unanswered before it counts as a failed check.
    /// Default: 15s.
    pub pong_timeout: Duration,
    /// Consecutive failed checks before a liveness disconnect is considered.
    /// Default: 2.
    pub required_failed_checks: u32,
    /// `is_connected()` turns false once the last pong is older than this.
    /// Default: 120s.
    pub pong_stale_after: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(15),
            required_failed_checks: 2,
            pong_stale_after: Duration::from_secs(120),
        }
    }
}

/// Configuration for a single device link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Server base URL; the device path is appended per session.
    pub endpoint: ServerEndpoint,
    /// Text that, found in a frame's content or raw text, requests a toggle.
    pub trigger_phrase: String,
    /// Strategy driving the autonomous reconnect loop.
    pub backoff: BackoffStrategy,
    pub heartbeat: HeartbeatConfig,
    /// Period of the `status: ready` refresh. Default: 5 min.
    pub status_refresh_interval: Duration,
    /// Minimum spacing between two connectivity flips away from Connected.
    /// Default: 5s.
    pub state_cooldown: Duration,
    /// Grace period for the close handshake before the socket is cancelled.
    /// Default: 1s.
    pub close_grace: Duration,
    /// Delay before reconnecting after the register frame could not be sent.
    /// Default: 1s.
    pub register_retry_delay: Duration,
    /// How long `verify()` waits for its pong. Default: 5s.
    pub verify_timeout: Duration,
}

impl LinkConfig {
    pub fn new(endpoint: ServerEndpoint) -> Self {
        Self {
            endpoint,
            trigger_phrase: DEFAULT_TRIGGER_PHRASE.to_owned(),
            backoff: BackoffStrategy::default(),
            heartbeat: HeartbeatConfig::default(),
            status_refresh_interval: Duration::from_secs(5 * 60),
            state_cooldown: Duration::from_secs(5),
            close_grace: Duration::from_secs(1),
            register_retry_delay: Duration::from_secs(1),
            verify_timeout: Duration::from_secs(5),
        }
    }

    /// Socket tuning for the default WebSocket connector.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            close_grace: self.close_grace,
        }
    }
}

// ── Core error types ──
//
// Errors surfaced by devlink-core. Transport failures from devlink-api are
// translated by the `From<devlink_api::Error>` impl below; callers of the
// controller never match on WebSocket details directly.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Identity ─────────────────────────────────────────────────────
    #[error("Invalid device identity '{value}': expected exactly 3 digits")]
    InvalidIdentity { value: String },

    #[error("Identity store error: {message}")]
    Identity { message: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Network unreachable, no session opened")]
    TransportUnreachable,

    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Socket rejected the {frame} frame")]
    TransientSendFailure { frame: &'static str },

    #[error("Not connected")]
    NotConnected,

    // ── Messages ─────────────────────────────────────────────────────
    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    // ── Effector ─────────────────────────────────────────────────────
    #[error("Network toggle capability is unavailable")]
    CapabilityUnavailable,

    #[error("Network toggle failed: {message}")]
    EffectorFailed { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Controller task has stopped")]
    ControllerStopped,
}

impl CoreError {
    /// Whether the reconnect loop should keep trying after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::TransientSendFailure { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<devlink_api::Error> for CoreError {
    fn from(err: devlink_api::Error) -> Self {
        match err {
            devlink_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            devlink_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("socket closed with code {code}: {reason}"),
            },
            devlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid server URL: {e}"),
            },
            devlink_api::Error::InvalidEndpoint { url, reason } => CoreError::Config {
                message: format!("invalid server endpoint {url}: {reason}"),
            },
            devlink_api::Error::Serialization(e) => CoreError::MalformedMessage {
                reason: e.to_string(),
            },
        }
    }
}

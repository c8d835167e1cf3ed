use thiserror::Error;

/// Top-level error type for the `devlink-api` crate.
///
/// Covers every failure mode of the transport layer: endpoint parsing,
/// the WebSocket handshake, abnormal closes, and frame encoding.
/// `devlink-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The URL parsed but cannot address a device endpoint.
    #[error("Invalid server endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A frame could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WebSocketConnect(_) => true,
            Self::WebSocketClosed { code, .. } => !crate::close_code::is_normal(*code),
            _ => false,
        }
    }
}

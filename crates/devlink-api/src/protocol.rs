//! Frames exchanged with the command server.
//!
//! Every frame is a UTF-8 JSON object discriminated by its `type` field.
//! Outbound frames are strongly typed; inbound frames are parsed leniently
//! because the server mixes control traffic (`pong`, `system`) with free-form
//! command payloads. Unknown fields are ignored and absent fields read as empty.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Status value announced after registration and on every refresh.
pub const STATUS_READY: &str = "ready";

/// WebSocket close codes the link cares about.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (client shutdown, page navigation).
    pub const GOING_AWAY: u16 = 1001;
    /// No close frame was received; the connection dropped.
    pub const ABNORMAL: u16 = 1006;

    /// Returns `true` for closes that were requested by one of the peers
    /// rather than caused by a transport failure.
    pub fn is_normal(code: u16) -> bool {
        code == NORMAL || code == GOING_AWAY
    }
}

// ── Outbound ─────────────────────────────────────────────────────────

/// A frame sent by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Announces the device code for this session.
    #[serde(rename_all = "camelCase")]
    Register { device_number: String, timestamp: i64 },

    /// Application-level status (`"ready"`).
    Status { status: String },

    /// Liveness probe. The server answers with a `pong` echoing `timestamp`.
    #[serde(rename_all = "camelCase")]
    Ping {
        timestamp: i64,
        device_id: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        verify_connection: bool,
    },

    /// Best-effort notice sent before the device closes the socket.
    #[serde(rename_all = "camelCase")]
    Disconnect { device_id: String, timestamp: i64 },

    /// Probe write used to double-check a suspected dead link.
    ConnectionTest { timestamp: i64 },
}

impl OutboundFrame {
    pub fn register(device_number: &str, timestamp: i64) -> Self {
        Self::Register {
            device_number: device_number.to_owned(),
            timestamp,
        }
    }

    pub fn ready() -> Self {
        Self::Status {
            status: STATUS_READY.to_owned(),
        }
    }

    pub fn ping(device_id: &str, timestamp: i64) -> Self {
        Self::Ping {
            timestamp,
            device_id: device_id.to_owned(),
            verify_connection: false,
        }
    }

    pub fn verify_ping(device_id: &str, timestamp: i64) -> Self {
        Self::Ping {
            timestamp,
            device_id: device_id.to_owned(),
            verify_connection: true,
        }
    }

    pub fn disconnect(device_id: &str, timestamp: i64) -> Self {
        Self::Disconnect {
            device_id: device_id.to_owned(),
            timestamp,
        }
    }

    /// Wire value of the `type` field, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Status { .. } => "status",
            Self::Ping { .. } => "ping",
            Self::Disconnect { .. } => "disconnect",
            Self::ConnectionTest { .. } => "connection_test",
        }
    }

    /// Encode as the JSON text sent on the socket.
    pub fn to_text(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A frame received from the server.
///
/// All fields are optional on the wire; use the accessors to read them with
/// "absent means empty" semantics. Field types are not trusted: scalars are
/// coerced to text, so any JSON object parses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    pub kind: Option<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub action: Option<String>,

    /// Device code the frame is addressed to. Absent means broadcast.
    #[serde(default, deserialize_with = "lenient::string")]
    pub target_device: Option<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub content: Option<String>,

    /// Human-readable text used by `system` frames.
    #[serde(default, deserialize_with = "lenient::string")]
    pub message: Option<String>,

    /// Server clock, epoch millis.
    #[serde(default, deserialize_with = "lenient::millis")]
    pub timestamp: Option<i64>,

    /// On `pong` frames: the `timestamp` of the ping being answered.
    #[serde(default, deserialize_with = "lenient::millis")]
    pub echo: Option<i64>,
}

impl InboundMessage {
    /// Parse a text frame. Fails only on text that is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }

    pub fn action(&self) -> &str {
        self.action.as_deref().unwrap_or("")
    }

    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Target device code, treating an empty string as absent.
    pub fn target_device(&self) -> Option<&str> {
        self.target_device.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_pong(&self) -> bool {
        self.kind() == "pong"
    }
}

/// Coercing field readers. The server relays operator-supplied bodies, so a
/// field may carry any JSON type.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Strings as-is, other scalars and nested values as their JSON text,
    /// `null` as absent.
    pub(super) fn string<'de, D>(de: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(de)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    /// Integer millis, or a string holding one. Anything else reads as absent.
    pub(super) fn millis<'de, D>(de: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

// devlink-core: connection lifecycle and session protocol for one device link.

pub mod capability;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod reconnect;
pub mod registration;
pub mod router;
pub mod state;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capability::{
    AssumeReachable, Collaborators, Connector, Effector, NetworkProbe, NoEffector,
    NotificationSink, WsConnector,
};
pub use config::{DEFAULT_TRIGGER_PHRASE, HeartbeatConfig, LinkConfig};
pub use controller::{Controller, ControllerEvent, LinkListener, LinkSnapshot};
pub use error::CoreError;
pub use identity::{DeviceCode, IdentityStore, MemoryIdentityStore};
pub use reconnect::{BackoffStrategy, ReconnectPolicy};
pub use router::{MessageRouter, Notification, Route};
pub use state::LinkStatus;

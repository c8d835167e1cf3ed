// devlink-api: Wire protocol and WebSocket channel for the device control link.

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod protocol;

pub use channel::{Channel, ChannelConfig, ChannelEvent, ChannelHandle, Outbound};
pub use endpoint::ServerEndpoint;
pub use error::Error;
pub use protocol::{InboundMessage, OutboundFrame, close_code};

// ── Collaborator seams ──
//
// Everything the controller needs from the outside world, behind narrow
// traits so the loop can be driven by real sockets in production and by
// in-memory fakes in tests.

use std::sync::Arc;

use devlink_api::channel::{self, Channel, ChannelConfig};
use futures_util::future::BoxFuture;
use url::Url;

use crate::config::LinkConfig;
use crate::error::CoreError;
use crate::identity::IdentityStore;
use crate::router::Notification;

/// Opens the per-device channel.
pub trait Connector: Send + Sync {
    fn open(&self, url: Url) -> BoxFuture<'_, Result<Channel, devlink_api::Error>>;
}

/// Production connector: a real WebSocket via tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: ChannelConfig,
}

impl WsConnector {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }
}

impl Connector for WsConnector {
    fn open(&self, url: Url) -> BoxFuture<'_, Result<Channel, devlink_api::Error>> {
        Box::pin(async move { channel::open(&url, &self.config).await })
    }
}

/// The external actor that performs the physical network toggle.
pub trait Effector: Send + Sync {
    fn is_available(&self) -> bool;

    /// Perform the toggle. Runs off the controller loop.
    fn execute(&self) -> BoxFuture<'_, Result<(), CoreError>>;
}

/// Effector used when no toggle mechanism is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEffector;

impl Effector for NoEffector {
    fn is_available(&self) -> bool {
        false
    }

    fn execute(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(async { Err(CoreError::CapabilityUnavailable) })
    }
}

/// Reports whether the underlying network can reach anything at all.
pub trait NetworkProbe: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// Probe for hosts without a reachability signal; lets the socket decide.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeReachable;

impl NetworkProbe for AssumeReachable {
    fn is_reachable(&self) -> bool {
        true
    }
}

/// Receives notification decisions.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// The controller's collaborators. Only the identity store is required.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityStore>,
    /// `None` opens real sockets tuned by the link config.
    pub connector: Option<Arc<dyn Connector>>,
    pub effector: Arc<dyn Effector>,
    pub network: Arc<dyn NetworkProbe>,
    pub notifications: Option<Arc<dyn NotificationSink>>,
}

impl Collaborators {
    pub fn new(identity: Arc<dyn IdentityStore>) -> Self {
        Self {
            identity,
            connector: None,
            effector: Arc::new(NoEffector),
            network: Arc::new(AssumeReachable),
            notifications: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_effector(mut self, effector: Arc<dyn Effector>) -> Self {
        self.effector = effector;
        self
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkProbe>) -> Self {
        self.network = network;
        self
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }

    /// The connector sessions are opened with.
    pub(crate) fn connector_for(&self, config: &LinkConfig) -> Arc<dyn Connector> {
        match &self.connector {
            Some(connector) => Arc::clone(connector),
            None => Arc::new(WsConnector::new(config.channel_config())),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("identity", &self.identity.get())
            .field("effector_available", &self.effector.is_available())
            .field("notifications", &self.notifications.is_some())
            .finish_non_exhaustive()
    }
}

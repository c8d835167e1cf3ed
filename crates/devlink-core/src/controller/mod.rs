// ── Controller ──
//
// Public handle to one device link. The handle is cheap to clone; all
// clones talk to the same background loop (see `actor`). State is
// published through a `watch` channel and observer events through a
// `broadcast` channel.

mod actor;
mod timers;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use self::actor::{LinkActor, LoopMsg, Op, Request};
use crate::capability::Collaborators;
use crate::config::LinkConfig;
use crate::error::CoreError;
use crate::identity::{DeviceCode, IdentityStore};
use crate::state::LinkStatus;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Something observers should know about, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A frame for this device (raw text), or an informational line.
    MessageReceived(String),
    /// The link went up (`true`) or down (`false`).
    ConnectionStateChanged(bool),
    /// A toggle was requested but the effector is unavailable.
    CapabilityRequired,
}

/// Callback-style observer. See [`Controller::attach_listener`].
pub trait LinkListener: Send + Sync {
    fn on_message_received(&self, raw: &str);
    fn on_connection_state_changed(&self, connected: bool);
    fn on_capability_required(&self);
}

/// Point-in-time view of the link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub status: LinkStatus,
    pub device: Option<DeviceCode>,
    pub connected_at: Option<Instant>,
    pub last_pong_at: Option<Instant>,
    pub reconnect_attempt: u32,
    pub toggle_in_flight: bool,
}

impl LinkSnapshot {
    /// Connected, and heard from the server within `stale_after`.
    ///
    /// Before the first pong the session start stands in for it.
    pub fn is_connected(&self, stale_after: Duration) -> bool {
        self.status == LinkStatus::Connected
            && self
                .last_pong_at
                .or(self.connected_at)
                .is_none_or(|at| at.elapsed() < stale_after)
    }
}

// ── Handle ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: LinkConfig,
    identity: Arc<dyn IdentityStore>,
    requests: mpsc::UnboundedSender<LoopMsg>,
    snapshot: watch::Receiver<LinkSnapshot>,
    events: broadcast::Sender<ControllerEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Start the controller loop. Nothing connects until [`connect`](Self::connect).
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: LinkConfig, deps: Collaborators) -> Self {
        let (requests, inbox) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(LinkSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let identity = Arc::clone(&deps.identity);

        let actor = LinkActor::new(
            config.clone(),
            deps,
            inbox,
            requests.downgrade(),
            snapshot_tx,
            events.clone(),
        );
        let task = tokio::spawn(actor.run());

        Self {
            inner: Arc::new(ControllerInner {
                config,
                identity,
                requests,
                snapshot,
                events,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    /// The device code currently held by the identity store.
    pub fn device(&self) -> Option<DeviceCode> {
        self.inner.identity.get()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open a session. No-op while an attempt is in flight or when no
    /// identity is set. Fails with [`CoreError::TransportUnreachable`]
    /// when the network probe says there is nothing to reach.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.request(Op::Connect).await
    }

    /// Stop for good: disables auto-reconnect, then tears the session down.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        self.request(Op::Disconnect).await
    }

    /// Tear the session down and reset heartbeat and backoff state.
    /// When this returns, [`is_connected`](Self::is_connected) is `false`.
    pub async fn force_disconnect(&self) -> Result<(), CoreError> {
        self.request(Op::ForceDisconnect).await
    }

    /// Validate, persist and switch to a new device code, reconnecting
    /// under it.
    pub async fn update_identity(&self, code: &str) -> Result<(), CoreError> {
        let code = DeviceCode::parse(code)?;
        self.request(Op::UpdateIdentity(code)).await
    }

    /// Send a verification ping; reconnect if it goes unanswered.
    pub async fn verify(&self) -> Result<(), CoreError> {
        self.request(Op::Verify).await
    }

    /// External signal that the network became reachable again.
    pub async fn network_available(&self) -> Result<(), CoreError> {
        self.request(Op::NetworkAvailable).await
    }

    /// Disconnect and stop the loop. Later calls fail with
    /// [`CoreError::ControllerStopped`].
    pub async fn shutdown(&self) {
        if let Err(e) = self.request(Op::Shutdown).await {
            debug!(error = %e, "controller already stopped");
        }
        if let Some(task) = self.inner.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "controller loop ended abnormally");
            }
        }
    }

    // ── State ────────────────────────────────────────────────────────

    /// Fast-path connectivity check. Never mutates state.
    pub fn is_connected(&self) -> bool {
        self.inner
            .snapshot
            .borrow()
            .is_connected(self.inner.config.heartbeat.pong_stale_after)
    }

    pub fn status(&self) -> LinkStatus {
        self.inner.snapshot.borrow().status
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn watch_state(&self) -> watch::Receiver<LinkSnapshot> {
        self.inner.snapshot.clone()
    }

    /// Subscribe to observer events.
    pub fn events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.inner.events.subscribe()
    }

    /// Deliver events to a callback listener until the controller stops.
    pub fn attach_listener(&self, listener: Arc<dyn LinkListener>) -> JoinHandle<()> {
        let mut rx = self.events();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ControllerEvent::MessageReceived(raw)) => listener.on_message_received(&raw),
                    Ok(ControllerEvent::ConnectionStateChanged(connected)) => {
                        listener.on_connection_state_changed(connected);
                    }
                    Ok(ControllerEvent::CapabilityRequired) => listener.on_capability_required(),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "listener lagging, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn request(&self, op: Op) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .requests
            .send(LoopMsg::Request(Request { op, reply }))
            .map_err(|_| CoreError::ControllerStopped)?;
        rx.await.map_err(|_| CoreError::ControllerStopped)?
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("endpoint", &self.inner.config.endpoint)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn snapshot_staleness_window() {
        let snap = LinkSnapshot {
            status: LinkStatus::Connected,
            connected_at: Some(Instant::now()),
            ..LinkSnapshot::default()
        };
        let window = Duration::from_secs(120);
        assert!(snap.is_connected(window));

        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(!snap.is_connected(window));

        let fresh = LinkSnapshot {
            last_pong_at: Some(Instant::now()),
            ..snap.clone()
        };
        assert!(fresh.is_connected(window));
    }

    #[tokio::test]
    async fn requests_fail_once_the_loop_is_gone() {
        let deps = Collaborators::new(Arc::new(crate::identity::MemoryIdentityStore::new()));
        let endpoint = "ws://127.0.0.1:9".parse().unwrap();
        let controller = Controller::spawn(LinkConfig::new(endpoint), deps);

        let mut rx = controller.watch_state();
        let mut state = tokio_test::task::spawn(rx.changed());
        tokio_test::assert_pending!(state.poll());
        drop(state);

        controller.shutdown().await;
        assert!(matches!(
            controller.connect().await,
            Err(CoreError::ControllerStopped)
        ));
        assert!(!controller.is_connected());
    }

    #[test]
    fn not_connected_unless_status_says_so() {
        let snap = LinkSnapshot {
            status: LinkStatus::Connecting,
            ..LinkSnapshot::default()
        };
        assert!(!snap.is_connected(Duration::from_secs(120)));
    }
}

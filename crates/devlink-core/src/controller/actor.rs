// ── Controller loop ──
//
// The single writer of all link state. Public API calls, socket events,
// timer firings and effector completions arrive as `LoopMsg`s on one
// queue and are handled to completion one at a time; nothing here awaits.
//
// Every session attempt gets a new epoch. Socket events and timers carry
// the epoch they were created under and are dropped once it is stale, so
// a torn-down session cannot revive itself.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use devlink_api::{Channel, ChannelEvent, ChannelHandle, OutboundFrame, close_code};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::timers::TimerSet;
use super::{ControllerEvent, LinkSnapshot};
use crate::capability::{Collaborators, Connector};
use crate::clock::LinkClock;
use crate::config::LinkConfig;
use crate::error::CoreError;
use crate::heartbeat::{HeartbeatMonitor, PongOutcome};
use crate::identity::DeviceCode;
use crate::reconnect::ReconnectPolicy;
use crate::registration::RegistrationProtocol;
use crate::router::{MessageRouter, Notification, Route, TriggerSource, should_notify};
use crate::state::{FlipDecision, FlipOrigin, LinkStatus, LivenessSignal, StateGate};

// ── Messages ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub(super) enum Op {
    Connect,
    Disconnect,
    ForceDisconnect,
    UpdateIdentity(DeviceCode),
    Verify,
    NetworkAvailable,
    Shutdown,
}

#[derive(Debug)]
pub(super) struct Request {
    pub(super) op: Op,
    pub(super) reply: oneshot::Sender<Result<(), CoreError>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TimerKind {
    HeartbeatTick,
    PongDeadline { sent_at: i64 },
    StatusRefresh,
    VerifyDeadline { sent_at: i64 },
    Reconnect,
    RetryConnect,
}

#[derive(Debug)]
pub(super) enum LoopMsg {
    Request(Request),
    Opened { epoch: u64, channel: Channel },
    OpenFailed { epoch: u64, error: devlink_api::Error },
    Transport { epoch: u64, event: ChannelEvent },
    Timer { epoch: u64, timer: TimerKind },
    ToggleFinished(Result<(), CoreError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToggleState {
    Idle,
    InFlight,
}

struct Session {
    handle: ChannelHandle,
    device: DeviceCode,
    forwarder: JoinHandle<()>,
}

fn post(tx: &mpsc::WeakUnboundedSender<LoopMsg>, msg: LoopMsg) {
    if let Some(tx) = tx.upgrade() {
        let _ = tx.send(msg);
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Actor ────────────────────────────────────────────────────────────

pub(super) struct LinkActor {
    config: LinkConfig,
    deps: Collaborators,
    connector: Arc<dyn Connector>,
    clock: LinkClock,
    inbox: mpsc::UnboundedReceiver<LoopMsg>,
    loopback: mpsc::WeakUnboundedSender<LoopMsg>,
    snapshot: watch::Sender<LinkSnapshot>,
    events: broadcast::Sender<ControllerEvent>,

    status: LinkStatus,
    session: Option<Session>,
    device: Option<DeviceCode>,
    connected_at: Option<Instant>,
    epoch: u64,
    auto_reconnect: bool,
    toggle: ToggleState,

    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectPolicy,
    gate: StateGate,
    registration: RegistrationProtocol,
    router: MessageRouter,
    timers: TimerSet,
}

impl LinkActor {
    pub(super) fn new(
        config: LinkConfig,
        deps: Collaborators,
        inbox: mpsc::UnboundedReceiver<LoopMsg>,
        loopback: mpsc::WeakUnboundedSender<LoopMsg>,
        snapshot: watch::Sender<LinkSnapshot>,
        events: broadcast::Sender<ControllerEvent>,
    ) -> Self {
        let reconnect = ReconnectPolicy::new(config.backoff);
        let gate = StateGate::new(config.state_cooldown, config.heartbeat.required_failed_checks);
        let registration = RegistrationProtocol::new(config.status_refresh_interval);
        let router = MessageRouter::new(config.trigger_phrase.clone());
        let device = deps.identity.get();
        let connector = deps.connector_for(&config);

        Self {
            config,
            deps,
            connector,
            clock: LinkClock::new(),
            inbox,
            loopback,
            snapshot,
            events,
            status: LinkStatus::Disconnected,
            session: None,
            device,
            connected_at: None,
            epoch: 0,
            auto_reconnect: false,
            toggle: ToggleState::Idle,
            heartbeat: HeartbeatMonitor::new(),
            reconnect,
            gate,
            registration,
            router,
            timers: TimerSet::new(),
        }
    }

    pub(super) async fn run(mut self) {
        debug!("controller loop started");
        self.publish();
        while let Some(msg) = self.inbox.recv().await {
            if self.handle(msg).is_break() {
                break;
            }
        }
        self.auto_reconnect = false;
        self.teardown();
        debug!("controller loop stopped");
    }

    fn handle(&mut self, msg: LoopMsg) -> ControlFlow<()> {
        match msg {
            LoopMsg::Request(request) => return self.on_request(request),
            LoopMsg::Opened { epoch, channel } => self.on_opened(epoch, channel),
            LoopMsg::OpenFailed { epoch, error } => self.on_open_failed(epoch, error),
            LoopMsg::Transport { epoch, event } => {
                if epoch == self.epoch {
                    self.on_transport(event);
                } else {
                    trace!(epoch, current = self.epoch, "dropping event from an old session");
                }
            }
            LoopMsg::Timer { epoch, timer } => {
                if epoch == self.epoch {
                    self.on_timer(timer);
                } else {
                    trace!(epoch, ?timer, "dropping stale timer");
                }
            }
            LoopMsg::ToggleFinished(result) => self.on_toggle_finished(result),
        }
        ControlFlow::Continue(())
    }

    fn on_request(&mut self, request: Request) -> ControlFlow<()> {
        let Request { op, reply } = request;
        debug!(?op, "api request");
        let mut flow = ControlFlow::Continue(());
        let result = match op {
            Op::Connect => self.connect(),
            Op::Disconnect => {
                self.auto_reconnect = false;
                self.teardown();
                info!("disconnected, auto-reconnect disabled");
                Ok(())
            }
            Op::ForceDisconnect => {
                self.teardown();
                Ok(())
            }
            Op::UpdateIdentity(code) => self.update_identity(code),
            Op::Verify => self.verify(),
            Op::NetworkAvailable => self.network_available(),
            Op::Shutdown => {
                self.auto_reconnect = false;
                self.teardown();
                flow = ControlFlow::Break(());
                Ok(())
            }
        };
        let _ = reply.send(result);
        flow
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    fn connect(&mut self) -> Result<(), CoreError> {
        if self.status == LinkStatus::Connecting {
            debug!("connect ignored, attempt already in flight");
            return Ok(());
        }
        let Some(device) = self.deps.identity.get() else {
            info!("connect ignored, no device identity set");
            return Ok(());
        };

        self.auto_reconnect = true;
        if self.session.is_some() || self.status != LinkStatus::Disconnected {
            self.teardown();
        }
        self.device = Some(device.clone());

        if !self.deps.network.is_reachable() {
            let err = CoreError::TransportUnreachable;
            warn!(device = %device, error = %err, "waiting for network");
            self.emit(ControllerEvent::MessageReceived(
                "Network unreachable, waiting for connectivity".into(),
            ));
            self.emit(ControllerEvent::ConnectionStateChanged(false));
            self.publish();
            return Err(err);
        }

        let url = self.config.endpoint.device_url(device.as_str())?;
        self.epoch += 1;
        self.set_status(LinkStatus::Connecting);
        info!(device = %device, url = %url, attempt = self.reconnect.attempt(), "opening session");

        let connector = Arc::clone(&self.connector);
        let loopback = self.loopback.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let msg = match connector.open(url).await {
                Ok(channel) => LoopMsg::Opened { epoch, channel },
                Err(error) => LoopMsg::OpenFailed { epoch, error },
            };
            post(&loopback, msg);
        });
        Ok(())
    }

    /// Cancel timers, send the disconnect notice, close the socket with a
    /// grace period and reset heartbeat and backoff state.
    fn teardown(&mut self) {
        self.timers.cancel_all();
        if let Some(session) = self.session.take() {
            let notice = OutboundFrame::disconnect(session.device.as_str(), self.clock.now_ms());
            if !session.handle.send_frame(&notice) {
                debug!("disconnect notice not sent, socket already gone");
            }
            session.forwarder.abort();
            session.handle.shutdown(close_code::NORMAL, "client disconnect");
        }
        self.epoch += 1;
        self.heartbeat.reset();
        self.reconnect.reset();
        self.set_status(LinkStatus::Disconnected);
    }

    /// The transport already ended the session; just drop our side.
    fn session_lost(&mut self) {
        self.timers.cancel_all();
        if let Some(session) = self.session.take() {
            session.forwarder.abort();
            session.handle.cancel();
        }
        self.epoch += 1;
        self.heartbeat.reset();
        self.set_status(LinkStatus::Disconnected);
    }

    fn update_identity(&mut self, code: DeviceCode) -> Result<(), CoreError> {
        self.deps.identity.set(&code)?;
        info!(device = %code, "device identity updated");
        self.device = Some(code);
        self.teardown();
        self.connect()
    }

    fn network_available(&mut self) -> Result<(), CoreError> {
        if self.status == LinkStatus::Disconnected && self.auto_reconnect {
            info!("network available, reconnecting");
            return self.connect();
        }
        debug!(status = %self.status, "network available, nothing to do");
        Ok(())
    }

    fn schedule(&self, delay: Duration, timer: TimerKind) {
        self.timers.schedule(
            delay,
            &self.loopback,
            LoopMsg::Timer {
                epoch: self.epoch,
                timer,
            },
        );
    }

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect {
            debug!("auto-reconnect disabled, staying disconnected");
            return;
        }
        let delay = self.reconnect.next_delay();
        info!(
            delay_ms = millis(delay),
            attempt = self.reconnect.attempt(),
            strategy = %self.reconnect.strategy(),
            "scheduling reconnect"
        );
        self.schedule(delay, TimerKind::Reconnect);
        self.publish();
    }

    // ── Session events ───────────────────────────────────────────────

    fn on_opened(&mut self, epoch: u64, channel: Channel) {
        let Channel { handle, events } = channel;
        if epoch != self.epoch || self.status != LinkStatus::Connecting {
            debug!(epoch, "closing socket opened for a superseded attempt");
            handle.shutdown(close_code::NORMAL, "superseded");
            return;
        }
        let Some(device) = self.device.clone() else {
            handle.shutdown(close_code::NORMAL, "no identity");
            self.set_status(LinkStatus::Disconnected);
            return;
        };

        let forwarder = spawn_forwarder(events, epoch, self.loopback.clone());
        let announced = self
            .registration
            .announce(&handle, &device, self.clock.now_ms());
        self.session = Some(Session {
            handle,
            device: device.clone(),
            forwarder,
        });

        if let Err(e) = announced {
            warn!(device = %device, error = %e, "registration failed, retrying shortly");
            self.teardown();
            self.schedule(self.config.register_retry_delay, TimerKind::RetryConnect);
            return;
        }

        self.heartbeat.reset();
        self.reconnect.reset();
        self.connected_at = Some(Instant::now());
        self.set_status(LinkStatus::Connected);
        info!(device = %device, "session established");
        self.notify(&Notification::connected(&device));

        self.schedule(self.config.heartbeat.interval, TimerKind::HeartbeatTick);
        self.schedule(self.registration.refresh_interval(), TimerKind::StatusRefresh);
    }

    fn on_open_failed(&mut self, epoch: u64, error: devlink_api::Error) {
        if epoch != self.epoch {
            return;
        }
        let error = CoreError::from(error);
        self.set_status(LinkStatus::Disconnected);
        if error.is_retryable() {
            warn!(error = %error, "session failed to open");
            self.schedule_reconnect();
        } else {
            error!(error = %error, "session cannot be opened, giving up");
            self.auto_reconnect = false;
        }
    }

    fn on_transport(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Text(raw) => self.on_frame(&raw),
            ChannelEvent::Closed { code, reason } => {
                info!(code, reason = %reason, "session closed");
                self.session_lost();
                if close_code::is_normal(code) {
                    info!(code, "normal closure, not reconnecting");
                } else {
                    self.schedule_reconnect();
                }
            }
            ChannelEvent::Failed(reason) => {
                warn!(reason = %reason, "session failed");
                self.session_lost();
                self.schedule_reconnect();
            }
        }
    }

    fn on_frame(&mut self, raw: &str) {
        trace!(raw, "frame received");
        match self.router.route(raw, self.device.as_ref()) {
            Route::Pong { timestamp } => {
                let pong_ts = timestamp.unwrap_or_else(|| self.clock.now_ms());
                match self.heartbeat.record_pong(pong_ts, Instant::now()) {
                    PongOutcome::Accepted => {
                        trace!(pong_ts, "pong accepted");
                        self.publish();
                    }
                    PongOutcome::Stale => debug!(
                        pong_ts,
                        last_ping = ?self.heartbeat.last_ping_sent_at(),
                        "ignoring pong older than the last ping"
                    ),
                }
            }
            Route::ForOtherDevice { target } => {
                debug!(target = %target, "frame addressed to another device, dropped");
            }
            Route::Toggle(source) => {
                self.deliver(raw);
                self.request_toggle(source);
            }
            Route::Unrecognized { kind, action } => {
                self.deliver(raw);
                info!(kind = %kind, action = %action, "unrecognized frame");
            }
            Route::Malformed { reason } => {
                self.deliver(raw);
                let err = CoreError::MalformedMessage { reason };
                warn!(error = %err, "dropping frame");
            }
        }
    }

    /// Hand a frame to observers and the notification sink.
    fn deliver(&self, raw: &str) {
        self.emit(ControllerEvent::MessageReceived(raw.to_owned()));
        if let Some(notification) = should_notify(raw) {
            self.notify(&notification);
        }
    }

    // ── Timers ───────────────────────────────────────────────────────

    fn on_timer(&mut self, timer: TimerKind) {
        match timer {
            TimerKind::HeartbeatTick => self.heartbeat_tick(),
            TimerKind::PongDeadline { sent_at } => self.pong_deadline(sent_at),
            TimerKind::StatusRefresh => self.status_refresh(),
            TimerKind::VerifyDeadline { sent_at } => self.verify_deadline(sent_at),
            TimerKind::Reconnect | TimerKind::RetryConnect => {
                if self.status != LinkStatus::Disconnected || !self.auto_reconnect {
                    return;
                }
                if let Err(e) = self.connect() {
                    warn!(error = %e, ?timer, "reconnect attempt did not start");
                }
            }
        }
    }

    fn heartbeat_tick(&mut self) {
        if self.status != LinkStatus::Connected {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };

        let now_ms = self.clock.now_ms();
        let ping = self.heartbeat.ping(session.device.as_str(), now_ms);
        if session.handle.send_frame(&ping) {
            trace!(ts = now_ms, "ping sent");
            self.schedule(
                self.config.heartbeat.pong_timeout,
                TimerKind::PongDeadline { sent_at: now_ms },
            );
        } else {
            let err = CoreError::TransientSendFailure { frame: ping.kind() };
            let failed = self.heartbeat.record_failure();
            warn!(failed, error = %err, "heartbeat ping rejected");
            self.liveness_failure(LivenessSignal::SendRejected);
        }

        if self.status == LinkStatus::Connected {
            self.schedule(self.config.heartbeat.interval, TimerKind::HeartbeatTick);
        }
    }

    fn pong_deadline(&mut self, sent_at: i64) {
        if self.status != LinkStatus::Connected || self.heartbeat.is_answered(sent_at) {
            return;
        }
        let failed = self.heartbeat.record_failure();
        warn!(failed, sent_at, "pong not received in time");
        self.liveness_failure(LivenessSignal::PongMissed);
    }

    fn liveness_failure(&mut self, signal: LivenessSignal) {
        let failed = self.heartbeat.consecutive_failed_checks();
        let decision =
            self.gate
                .decide_disconnect(FlipOrigin::Liveness(signal), failed, Instant::now());
        match decision {
            FlipDecision::Defer => {
                debug!(failed, ?signal, "liveness failure recorded, keeping session");
            }
            FlipDecision::ProbeFirst => {
                let probe = OutboundFrame::ConnectionTest {
                    timestamp: self.clock.now_ms(),
                };
                let accepted = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.handle.send_frame(&probe));
                if accepted {
                    info!(failed, "probe write accepted, keeping session");
                    self.heartbeat.reset_failures();
                } else {
                    warn!(failed, "probe write refused, dropping session");
                    self.teardown();
                    self.schedule_reconnect();
                }
            }
            FlipDecision::Apply => {
                warn!(failed, ?signal, "liveness lost, dropping session");
                self.teardown();
                self.schedule_reconnect();
            }
        }
    }

    fn status_refresh(&mut self) {
        if self.status != LinkStatus::Connected {
            return;
        }
        if let Some(session) = &self.session {
            if !self.registration.refresh(&session.handle) {
                warn!("status refresh rejected by socket");
            }
        }
        self.schedule(self.registration.refresh_interval(), TimerKind::StatusRefresh);
    }

    // ── Verification ─────────────────────────────────────────────────

    fn verify(&mut self) -> Result<(), CoreError> {
        let Some(session) = self.session.as_ref().filter(|_| self.status == LinkStatus::Connected)
        else {
            info!(status = %self.status, "verify requested while not connected");
            self.emit(ControllerEvent::ConnectionStateChanged(false));
            return Ok(());
        };

        let now_ms = self.clock.now_ms();
        let ping = self.heartbeat.verify_ping(session.device.as_str(), now_ms);
        if session.handle.send_frame(&ping) {
            debug!(ts = now_ms, "verification ping sent");
            self.schedule(
                self.config.verify_timeout,
                TimerKind::VerifyDeadline { sent_at: now_ms },
            );
            return Ok(());
        }

        warn!("verification ping rejected, reconnecting");
        self.teardown();
        self.connect()
    }

    fn verify_deadline(&mut self, sent_at: i64) {
        if self.status != LinkStatus::Connected {
            return;
        }
        if self.heartbeat.is_answered(sent_at) {
            info!("connection verified");
            if let Some(session) = &self.session {
                self.registration.refresh(&session.handle);
            }
            return;
        }
        warn!(sent_at, "verification pong missing, reconnecting");
        self.teardown();
        if let Err(e) = self.connect() {
            warn!(error = %e, "reconnect after failed verification did not start");
        }
    }

    // ── Effector ─────────────────────────────────────────────────────

    fn request_toggle(&mut self, source: TriggerSource) {
        if self.toggle == ToggleState::InFlight {
            info!(?source, "toggle already in flight, ignoring request");
            return;
        }
        if !self.deps.effector.is_available() {
            warn!(error = %CoreError::CapabilityUnavailable, ?source, "cannot toggle network");
            self.emit(ControllerEvent::MessageReceived(
                "Network toggle requested but the capability is unavailable".into(),
            ));
            self.emit(ControllerEvent::CapabilityRequired);
            return;
        }

        info!(?source, "network toggle requested");
        self.emit(ControllerEvent::MessageReceived(
            "Network toggle requested".into(),
        ));
        self.toggle = ToggleState::InFlight;
        self.publish();

        let effector = Arc::clone(&self.deps.effector);
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let result = effector.execute().await;
            post(&loopback, LoopMsg::ToggleFinished(result));
        });
    }

    fn on_toggle_finished(&mut self, result: Result<(), CoreError>) {
        self.toggle = ToggleState::Idle;
        match result {
            Ok(()) => info!("network toggle completed"),
            Err(e) => warn!(error = %e, "network toggle failed"),
        }
        self.publish();
    }

    // ── Observers ────────────────────────────────────────────────────

    fn set_status(&mut self, next: LinkStatus) {
        let prev = std::mem::replace(&mut self.status, next);
        let was_connected = prev == LinkStatus::Connected;
        let now_connected = next == LinkStatus::Connected;

        if was_connected != now_connected {
            self.gate.record_flip(Instant::now());
            self.heartbeat.reset_failures();
            if !now_connected {
                self.connected_at = None;
            }
            info!(from = %prev, to = %next, "connection state changed");
            self.emit(ControllerEvent::ConnectionStateChanged(now_connected));
        } else if prev != next {
            debug!(from = %prev, to = %next, "link status");
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(LinkSnapshot {
            status: self.status,
            device: self.device.clone(),
            connected_at: self.connected_at,
            last_pong_at: self.heartbeat.last_pong_received_at(),
            reconnect_attempt: self.reconnect.attempt(),
            toggle_in_flight: self.toggle == ToggleState::InFlight,
        });
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&self, notification: &Notification) {
        if let Some(sink) = &self.deps.notifications {
            sink.notify(notification);
        }
    }
}

/// Pump one channel's events into the loop, tagged with their epoch.
fn spawn_forwarder(
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    epoch: u64,
    loopback: mpsc::WeakUnboundedSender<LoopMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (event, terminal) = match events.recv().await {
                Some(event @ ChannelEvent::Text(_)) => (event, false),
                Some(event) => (event, true),
                None => (ChannelEvent::Failed("event stream ended".into()), true),
            };
            let Some(tx) = loopback.upgrade() else { break };
            if tx.send(LoopMsg::Transport { epoch, event }).is_err() || terminal {
                break;
            }
        }
    })
}

//! WebSocket channel to the command server.
//!
//! [`open`] performs the handshake and splits the socket into two background
//! tasks: a writer draining an unbounded outbound queue and a reader turning
//! socket frames into [`ChannelEvent`]s. The caller keeps the
//! [`ChannelHandle`] (the only way to write) and the event receiver.
//!
//! Writes are fire-and-forget, mirroring a message-oriented socket API:
//! [`ChannelHandle::send_text`] returns `false` once the socket is known to be
//! gone, and `true` when the frame was queued.
//!
//! # Example
//!
//! ```rust,ignore
//! use devlink_api::channel::{self, ChannelConfig};
//! use devlink_api::{ChannelEvent, OutboundFrame};
//! use url::Url;
//!
//! let url = Url::parse("ws://10.0.0.5:9000/device/042")?;
//! let mut channel = channel::open(&url, &ChannelConfig::default()).await?;
//! channel.handle.send_frame(&OutboundFrame::ready());
//!
//! while let Some(event) = channel.events.recv().await {
//!     match event {
//!         ChannelEvent::Text(text) => println!("{text}"),
//!         ChannelEvent::Closed { code, .. } => break,
//!         ChannelEvent::Failed(reason) => break,
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::protocol::{OutboundFrame, close_code};

/// Close code reported when the server sent a close frame without a payload.
const NO_STATUS_RECEIVED: u16 = 1005;

// ── Types ────────────────────────────────────────────────────────────

/// Something the writer task should put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Something the reader task observed on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A UTF-8 text frame.
    Text(String),
    /// The socket closed. `code` is the peer's close code, or 1006 when the
    /// stream ended without a close frame.
    Closed { code: u16, reason: String },
    /// The socket failed with a protocol or I/O error.
    Failed(String),
}

/// Tuning for a single channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long a graceful close may take before the socket is torn down.
    /// Default: 1s.
    pub close_grace: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            close_grace: Duration::from_secs(1),
        }
    }
}

/// An open channel: the write handle plus the inbound event stream.
#[derive(Debug)]
pub struct Channel {
    pub handle: ChannelHandle,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

// ── ChannelHandle ────────────────────────────────────────────────────

/// Write side of an open channel.
///
/// Deliberately not `Clone`: exactly one owner decides when the socket dies.
#[derive(Debug)]
pub struct ChannelHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
    close_grace: Duration,
}

impl ChannelHandle {
    /// Build a handle over an outbound queue and the token that stops the
    /// channel's background tasks. Used by [`open`] and by alternative
    /// transports that feed the same queue.
    pub fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        cancel: CancellationToken,
        close_grace: Duration,
    ) -> Self {
        Self {
            outbound,
            cancel,
            close_grace,
        }
    }

    /// Queue a text frame. Returns `false` if the socket is already gone.
    pub fn send_text(&self, text: String) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    /// Encode and queue a protocol frame.
    pub fn send_frame(&self, frame: &OutboundFrame) -> bool {
        match frame.to_text() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::warn!(error = %e, kind = frame.kind(), "failed to encode frame");
                false
            }
        }
    }

    /// Returns `true` while the writer is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.outbound.is_closed()
    }

    /// Graceful close, then a hard cancel once the grace period elapses.
    ///
    /// Must be called from within a tokio runtime.
    pub fn shutdown(self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });

        let cancel = self.cancel;
        let grace = self.close_grace;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(grace) => {
                    tracing::debug!("close grace elapsed, cancelling socket");
                    cancel.cancel();
                }
            }
        });
    }

    /// Tear the socket down immediately, without a close handshake.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

// ── Open ─────────────────────────────────────────────────────────────

/// Perform the WebSocket handshake and spawn the reader/writer tasks.
pub async fn open(url: &Url, config: &ChannelConfig) -> Result<Channel, Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");

    let (write, read) = ws_stream.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    tokio::spawn(write_loop(write, outbound_rx, cancel.clone()));
    tokio::spawn(read_loop(read, event_tx, cancel.clone()));

    Ok(Channel {
        handle: ChannelHandle::new(outbound_tx, cancel, config.close_grace),
        events: event_rx,
    })
}

// ── Background tasks ─────────────────────────────────────────────────

/// Drain the outbound queue onto the socket until cancelled, closed, or a
/// write fails.
async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = outbound.recv() => {
                match next {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            tracing::warn!(error = %e, "WebSocket write failed");
                            cancel.cancel();
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        tracing::debug!(code, reason = %reason, "sending close frame");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            tracing::debug!(error = %e, "close frame not delivered");
                        }
                        break;
                    }
                    None => {
                        // Handle dropped without an explicit close.
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        }
    }

    tracing::trace!("WebSocket writer exiting");
}

/// Forward socket frames as [`ChannelEvent`]s. Emits exactly one terminal
/// event (`Closed` or `Failed`) unless the channel was cancelled first.
async fn read_loop<R>(
    mut read: R,
    events: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
) where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let terminal = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!(len = text.len(), "WebSocket text frame");
                        let _ = events.send(ChannelEvent::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or_else(
                            || (NO_STATUS_RECEIVED, String::new()),
                            |cf| (u16::from(cf.code), cf.reason.as_str().to_owned()),
                        );
                        tracing::info!(code, reason = %reason, "WebSocket close frame received");
                        break ChannelEvent::Closed { code, reason };
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers protocol pings itself
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- not part of the protocol
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read failed");
                        break ChannelEvent::Failed(e.to_string());
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break ChannelEvent::Closed {
                            code: close_code::ABNORMAL,
                            reason: "stream ended".into(),
                        };
                    }
                }
            }
        }
    };

    // Writes after this point must report failure.
    cancel.cancel();
    let _ = events.send(terminal);
}

// ── Tests ────────────────────────────────────────────────────────────

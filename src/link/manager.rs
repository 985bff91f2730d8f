//! WebSocket connection task.
//!
//! [`ConnectionManager`] owns the one duplex channel to the backend.  It runs
//! as a single tokio task that multiplexes commands from any number of
//! [`ConnectionHandle`]s, the pending handshake, inbound frames and the
//! reconnect timer.  Inbound text frames and lifecycle changes are published
//! as [`LinkEvent`]s.
//!
//! The handshake is polled as its own `select!` branch, so a shutdown can
//! abandon it; it is also bounded by `connect_timeout_ms`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::session::{Session, SessionState};
use crate::config::LinkConfig;
use crate::protocol::Envelope;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handshake = BoxFuture<'static, Result<WsStream, LinkError>>;

// ---------------------------------------------------------------------------
// Events, commands, errors
// ---------------------------------------------------------------------------

/// Lifecycle and traffic published by the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connecting,
    Opened,
    Closed,
    Inbound(String),
}

#[derive(Debug)]
enum LinkCommand {
    Connect,
    Send(String),
    Shutdown,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake did not complete within {0:?}")]
    Timeout(Duration),

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("connection task has stopped")]
    Stopped,
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable front door to the connection task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: UnboundedSender<LinkCommand>,
    state: Arc<Mutex<SessionState>>,
}

impl ConnectionHandle {
    /// Ask the task to connect.  No-op when already connecting or open.
    pub fn connect(&self) -> Result<(), LinkError> {
        self.tx
            .send(LinkCommand::Connect)
            .map_err(|_| LinkError::Stopped)
    }

    /// Best-effort send.  Returns `false` when the message was dropped
    /// because the link is not open; nothing is buffered.
    pub fn send(&self, envelope: &Envelope) -> bool {
        match serde_json::to_string(envelope) {
            Ok(json) => self.send_raw(json),
            Err(e) => {
                log::warn!("link: {}", LinkError::from(e));
                false
            }
        }
    }

    pub fn send_raw(&self, json: String) -> bool {
        let state = self.state();
        if state != SessionState::Open {
            log::warn!("link: dropping outbound message, link is {state}");
            return false;
        }
        self.tx.send(LinkCommand::Send(json)).is_ok()
    }

    /// Close the transport and stop the task.  No reconnect follows.
    pub fn shutdown(&self) {
        let _ = self.tx.send(LinkCommand::Shutdown);
    }

    pub fn state(&self) -> SessionState {
        match self.state.lock() {
            Ok(s) => *s,
            Err(p) => *p.into_inner(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

pub struct ConnectionManager {
    url: String,
    connect_timeout: Duration,
    session: Session,
    events: UnboundedSender<LinkEvent>,
    state: Arc<Mutex<SessionState>>,
}

impl ConnectionManager {
    pub fn new(config: &LinkConfig, events: UnboundedSender<LinkEvent>) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout: config.connect_timeout(),
            session: Session::new(config.reconnect_delay()),
            events,
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
        }
    }

    /// Spawn the connection task.  It stays disconnected until
    /// [`ConnectionHandle::connect`] is called.
    pub fn spawn(self) -> (ConnectionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            tx,
            state: Arc::clone(&self.state),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: UnboundedReceiver<LinkCommand>) {
        let mut ws: Option<WsStream> = None;
        let mut pending: Option<Handshake> = None;

        loop {
            let retry_at = self.session.retry_at();

            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(LinkCommand::Connect) => self.connect(&mut pending),
                    Some(LinkCommand::Send(json)) => self.write(&mut ws, json).await,
                    Some(LinkCommand::Shutdown) | None => {
                        if pending.take().is_some() {
                            log::debug!("link: abandoning handshake with {}", self.url);
                        }
                        self.shutdown(&mut ws).await;
                        break;
                    }
                },

                result = handshake(&mut pending), if pending.is_some() => {
                    pending = None;
                    match result {
                        Ok(stream) => {
                            ws = Some(stream);
                            self.session.opened();
                            log::info!("link: connected to {}", self.url);
                            self.publish(LinkEvent::Opened);
                        }
                        Err(e) => {
                            log::warn!("link: connect to {} failed: {e}", self.url);
                            self.closed();
                        }
                    }
                },

                frame = next_frame(&mut ws), if ws.is_some() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = self.events.send(LinkEvent::Inbound(text));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("link: closed by server");
                        ws = None;
                        self.closed();
                    }
                    Some(Err(e)) => {
                        log::warn!("link: read error: {e}");
                        ws = None;
                        self.closed();
                    }
                    Some(Ok(_)) => {} // binary, ping, pong
                },

                _ = sleep_until_opt(retry_at), if retry_at.is_some() => {
                    if self.session.take_retry(Instant::now()) {
                        log::info!("link: reconnecting to {}", self.url);
                        self.connect(&mut pending);
                    }
                }
            }
        }

        log::debug!("link: task stopped");
    }

    /// Start a handshake; the run loop polls it to completion.
    fn connect(&mut self, pending: &mut Option<Handshake>) {
        if !self.session.begin_connect() {
            log::debug!("link: connect ignored, link is {}", self.session.state());
            return;
        }
        self.publish(LinkEvent::Connecting);

        let url = self.url.clone();
        let limit = self.connect_timeout;
        *pending = Some(
            async move {
                match tokio::time::timeout(limit, connect_async(url.as_str())).await {
                    Ok(Ok((stream, _))) => Ok(stream),
                    Ok(Err(e)) => Err(LinkError::from(e)),
                    Err(_) => Err(LinkError::Timeout(limit)),
                }
            }
            .boxed(),
        );
    }

    async fn write(&mut self, ws: &mut Option<WsStream>, json: String) {
        let Some(stream) = ws.as_mut().filter(|_| self.session.is_open()) else {
            log::warn!("link: dropping outbound message, link is {}", self.session.state());
            return;
        };
        if let Err(e) = stream.send(Message::Text(json)).await {
            // The read side reports the close that follows.
            log::warn!("link: send failed: {e}");
        }
    }

    async fn shutdown(&mut self, ws: &mut Option<WsStream>) {
        self.session.begin_close();
        self.sync_state();
        if let Some(mut stream) = ws.take() {
            if let Err(e) = stream.close(None).await {
                log::debug!("link: close handshake failed: {e}");
            }
        }
        self.session.closed(Instant::now());
        self.publish(LinkEvent::Closed);
    }

    fn closed(&mut self) {
        if self.session.closed(Instant::now()) {
            log::info!(
                "link: retrying in {} ms",
                self.session
                    .retry_at()
                    .map(|at| at.saturating_duration_since(Instant::now()).as_millis())
                    .unwrap_or_default()
            );
        }
        self.publish(LinkEvent::Closed);
    }

    fn publish(&self, event: LinkEvent) {
        self.sync_state();
        let _ = self.events.send(event);
    }

    fn sync_state(&self) {
        let mut s = match self.state.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };
        *s = self.session.state();
    }
}

async fn handshake(pending: &mut Option<Handshake>) -> Result<WsStream, LinkError> {
    match pending.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    ws: &mut Option<WsStream>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match ws.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

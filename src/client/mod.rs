//! Push channel subscriber with heartbeat and bounded auto-reconnect
//!
//! A [`ConnectionManager`] runs as its own task and is the only owner of its
//! [`ConnectionStatus`]. Callers drive it through a cloneable [`ConnectionHandle`] and
//! observe it through a `watch` channel.
//!
//! ```text
//!                 connect()/reconnect()
//! Disconnected ───────────────────────────► Connecting ──open ok──► Connected
//!      ▲                                      │    ▲                    │
//!      │ disconnect()                    open │    │ delay elapsed      │ transport closed
//!      │ (from any state)              failed ▼    │ (attempts < max)   ▼
//!      └──────────────────────────────── Reconnecting ◄─────────────────┘
//!                                             │
//!                                             │ attempts == max
//!                                             ▼
//!                                           Failed ── reconnect() ──► Connecting
//! ```
//!
//! The first open is not counted as a reconnect attempt; every timer driven open is. With
//! `max_attempts = N` and a transport that never comes up the manager therefore opens
//! `1 + N` times before it settles in `Failed`.

pub mod api;
#[cfg(feature = "client")]
pub mod config;
#[cfg(feature = "client")]
pub mod websocket;

use std::fmt;
use std::future::pending;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::ReconnectConfig;
use crate::protocol::{Envelope, Inbound, route_inbound};

/// Error message recorded when the manager gives up
pub const MAX_ATTEMPTS_REACHED: &str = "max reconnection attempts reached";

#[derive(Debug)]
pub enum TransportError {
    /// Opening the channel failed
    Connect(String),

    /// Opening the channel did not finish within the handshake timeout
    HandshakeTimeout(Duration),

    Send(String),

    Receive(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "failed to connect: {}", msg),
            TransportError::HandshakeTimeout(after) => {
                write!(f, "handshake timed out after {}ms", after.as_millis())
            }
            TransportError::Send(msg) => write!(f, "failed to send: {}", msg),
            TransportError::Receive(msg) => write!(f, "failed to receive: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Opens push channel connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open push channel
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next text frame, `None` once the peer closed the channel
    ///
    /// Must be cancel safe: the manager polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub reconnect_delay: Duration,
    pub max_attempts: u32,
    /// Send a `ping` envelope this often while connected
    pub heartbeat_interval: Option<Duration>,
    pub handshake_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(3_000),
            max_attempts: 10,
            heartbeat_interval: Some(Duration::from_secs(30)),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ReconnectConfig> for ConnectionOptions {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            reconnect_delay: Duration::from_millis(config.delay_ms),
            max_attempts: config.max_attempts,
            ..Self::default()
        }
    }
}

enum Handshake {
    Finished(Result<Box<dyn Connection>, TransportError>),
    Restarted,
    Disconnected,
    Abandoned,
}

#[derive(Debug)]
enum ConnectionCommand {
    Connect,
    Disconnect,
    Reconnect,
    Send(Envelope),
}

async fn next_frame(
    connection: &mut Option<Box<dyn Connection>>,
) -> Option<Result<String, TransportError>> {
    match connection {
        Some(connection) => connection.recv().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn heartbeat_due(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(heartbeat) => {
            heartbeat.tick().await;
        }
        None => pending().await,
    }
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    options: ConnectionOptions,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    inbound_tx: mpsc::UnboundedSender<Envelope>,
    status_tx: watch::Sender<ConnectionStatus>,
    status: ConnectionStatus,
    connection: Option<Box<dyn Connection>>,
    should_reconnect: bool,
    reconnect_at: Option<Instant>,
    heartbeat: Option<Interval>,
    shutdown: CancellationToken,
}

impl<C: Connector> ConnectionManager<C> {
    #[instrument(skip(self), name = "connection_manager")]
    async fn run(mut self) {
        debug!("starting connection manager");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("shutdown requested");
                    break;
                }

                // inbound first, so a pong leaves ahead of queued sends
                frame = next_frame(&mut self.connection) => self.handle_frame(frame).await,

                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!("all handles dropped, shutting down");
                        break;
                    }
                },

                _ = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.status.attempts += 1;
                    info!(
                        "reconnect attempt {}/{}",
                        self.status.attempts, self.options.max_attempts
                    );
                    self.open().await;
                }

                _ = heartbeat_due(&mut self.heartbeat) => {
                    self.send(Envelope::ping()).await;
                }
            }
        }

        self.close_connection().await;
        debug!("connection manager stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.status.state != state {
            debug!("{} -> {}", self.status.state, state);
        }
        self.status.state = state;
        self.status_tx.send_replace(self.status.clone());
    }

    async fn handle_command(&mut self, cmd: ConnectionCommand) {
        match cmd {
            ConnectionCommand::Connect => match self.status.state {
                ConnectionState::Disconnected => {
                    self.should_reconnect = true;
                    self.open().await;
                }
                ConnectionState::Failed => {
                    warn!("connection failed permanently, call reconnect() to try again");
                }
                state => trace!("connect() ignored while {}", state),
            },

            ConnectionCommand::Disconnect => {
                self.close_connection().await;
                self.disconnected();
            }

            ConnectionCommand::Reconnect => {
                self.should_reconnect = true;
                self.reconnect_at = None;
                self.close_connection().await;
                self.status.attempts = 0;
                self.open().await;
            }

            ConnectionCommand::Send(envelope) => {
                if self.status.state == ConnectionState::Connected {
                    self.send(envelope).await;
                } else {
                    warn!(
                        "dropping outbound '{}' message while {}",
                        envelope.kind(),
                        self.status.state
                    );
                }
            }
        }
    }

    fn disconnected(&mut self) {
        self.should_reconnect = false;
        self.reconnect_at = None;
        self.status.attempts = 0;
        self.status.last_error = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Open the transport while still answering shutdown and commands
    async fn open(&mut self) {
        self.set_state(ConnectionState::Connecting);

        let limit = self.options.handshake_timeout;
        let result = loop {
            let outcome = {
                let handshake = timeout(limit, self.connector.connect());
                tokio::pin!(handshake);

                loop {
                    tokio::select! {
                        biased;

                        _ = self.shutdown.cancelled() => break Handshake::Abandoned,

                        cmd = self.command_rx.recv() => match cmd {
                            Some(ConnectionCommand::Disconnect) => break Handshake::Disconnected,
                            Some(ConnectionCommand::Reconnect) => break Handshake::Restarted,
                            Some(ConnectionCommand::Connect) => {
                                trace!("connect() ignored while connecting");
                            }
                            Some(ConnectionCommand::Send(envelope)) => {
                                warn!(
                                    "dropping outbound '{}' message while connecting",
                                    envelope.kind()
                                );
                            }
                            // run() sees the closed channel next
                            None => break Handshake::Abandoned,
                        },

                        result = &mut handshake => {
                            break Handshake::Finished(
                                result.unwrap_or_else(|_| Err(TransportError::HandshakeTimeout(limit))),
                            );
                        }
                    }
                }
            };

            match outcome {
                Handshake::Finished(result) => break result,
                Handshake::Restarted => {
                    debug!("handshake restarted by reconnect()");
                    self.should_reconnect = true;
                    self.status.attempts = 0;
                }
                Handshake::Disconnected => {
                    debug!("handshake abandoned by disconnect()");
                    self.disconnected();
                    return;
                }
                Handshake::Abandoned => return,
            }
        };

        match result {
            Ok(connection) => {
                info!("push channel connected");
                self.connection = Some(connection);
                self.status.attempts = 0;
                self.status.last_error = None;
                self.heartbeat = self.options.heartbeat_interval.map(|period| {
                    let mut heartbeat = interval_at(Instant::now() + period, period);
                    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    heartbeat
                });
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => self.transport_failed(e.to_string()),
        }
    }

    /// React to a failed open or a channel that went away
    fn transport_failed(&mut self, reason: String) {
        self.connection = None;
        self.heartbeat = None;

        if !self.should_reconnect {
            self.status.last_error = Some(reason);
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        if self.status.attempts >= self.options.max_attempts {
            error!(
                "{} ({}), last error: {}",
                MAX_ATTEMPTS_REACHED, self.options.max_attempts, reason
            );
            self.reconnect_at = None;
            self.status.last_error = Some(MAX_ATTEMPTS_REACHED.to_string());
            self.set_state(ConnectionState::Failed);
            return;
        }

        warn!(
            "push channel unavailable: {}, retrying in {}ms",
            reason,
            self.options.reconnect_delay.as_millis()
        );
        self.status.last_error = Some(reason);
        self.reconnect_at = Some(Instant::now() + self.options.reconnect_delay);
        self.set_state(ConnectionState::Reconnecting);
    }

    async fn handle_frame(&mut self, frame: Option<Result<String, TransportError>>) {
        match frame {
            Some(Ok(text)) => match route_inbound(&text) {
                Some(Inbound::Reply(pong)) => self.send(pong).await,
                Some(Inbound::Forward(envelope)) => {
                    if self.inbound_tx.send(envelope).is_err() {
                        trace!("inbound receiver dropped, message discarded");
                    }
                }
                None => {}
            },
            Some(Err(e)) => {
                self.close_connection().await;
                self.transport_failed(e.to_string());
            }
            None => {
                self.close_connection().await;
                self.transport_failed("connection closed by peer".to_string());
            }
        }
    }

    async fn send(&mut self, envelope: Envelope) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                error!("dropping outbound message: {}", e);
                return;
            }
        };

        if let Err(e) = connection.send(text).await {
            self.close_connection().await;
            self.transport_failed(e.to_string());
        }
    }

    async fn close_connection(&mut self) {
        self.heartbeat = None;
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
    }
}

/// Handle for controlling a [`ConnectionManager`]
///
/// Every method returns immediately; the manager applies commands in order. The manager
/// shuts down when `shutdown` is called or the last handle is dropped.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<ConnectionCommand>,
    status: watch::Receiver<ConnectionStatus>,
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    /// Spawn a manager in the `Disconnected` state
    ///
    /// Returns the handle together with the receiver of forwarded inbound messages.
    pub fn spawn<C: Connector>(
        connector: C,
        options: ConnectionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let shutdown = CancellationToken::new();

        let manager = ConnectionManager {
            connector,
            options,
            command_rx: cmd_rx,
            inbound_tx,
            status_tx,
            status: ConnectionStatus::default(),
            connection: None,
            should_reconnect: false,
            reconnect_at: None,
            heartbeat: None,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(manager.run());

        let handle = Self {
            commands: cmd_tx,
            status: status_rx,
            shutdown,
        };
        (handle, inbound_rx)
    }

    fn command(&self, cmd: ConnectionCommand) {
        if self.commands.send(cmd).is_err() {
            debug!("connection manager is gone, command ignored");
        }
    }

    pub fn connect(&self) {
        self.command(ConnectionCommand::Connect);
    }

    /// Close the channel and cancel any pending reconnect
    pub fn disconnect(&self) {
        self.command(ConnectionCommand::Disconnect);
    }

    /// Reset the attempt counter and open a fresh channel, also out of `Failed`
    pub fn reconnect(&self) {
        self.command(ConnectionCommand::Reconnect);
    }

    /// Send an envelope if connected; otherwise the envelope is dropped with a warning
    pub fn send_message(&self, envelope: Envelope) {
        self.command(ConnectionCommand::Send(envelope));
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `predicate`
    ///
    /// Returns `None` if the manager shut down first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ConnectionStatus) -> bool,
    ) -> Option<ConnectionStatus> {
        let mut status = self.status.clone();
        let result = status.wait_for(|s| predicate(s)).await;
        result.ok().map(|s| s.clone())
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

//! Drives [`ChannelMachine`] over a real `WebSocket`.
//!
//! One task owns the socket, the reconnect timer, and the machine. Callers
//! talk to it through [`ManagerHandle`] and observe state on a `watch`
//! channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::cache::{AlertSink, CacheInvalidator};
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::inbound::handle_text;
use crate::state::{ChannelEvent, ChannelMachine, ChannelState, Effect};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Connecting = Pin<Box<dyn Future<Output = Result<WsStream, tungstenite::Error>> + Send>>;

enum Command {
    SetToken(String),
    ClearToken,
    Shutdown,
}

/// Spawns the connection manager task.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Start an idle manager. It connects once a token is set.
    pub fn spawn(
        config: ClientConfig,
        invalidator: Arc<dyn CacheInvalidator>,
        alerts: Arc<dyn AlertSink>,
    ) -> ManagerHandle {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Idle);
        let attempts = Arc::new(AtomicU64::new(0));

        let driver = Driver {
            machine: ChannelMachine::new(config.reconnect_delay),
            config,
            invalidator,
            alerts,
            state_tx,
            attempts: attempts.clone(),
            transport: None,
            connecting: None,
            reconnect: None,
        };
        let task = tokio::spawn(driver.run(command_rx));

        ManagerHandle {
            commands,
            state: state_rx,
            attempts,
            task,
        }
    }
}

/// Handle to a running connection manager.
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChannelState>,
    attempts: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl ManagerHandle {
    /// Supply a token (login or refresh).
    pub fn set_token(&self, token: impl Into<String>) -> Result<(), ClientError> {
        self.commands
            .send(Command::SetToken(token.into()))
            .map_err(|_| ClientError::Stopped)
    }

    /// Forget the token and close the channel (logout).
    pub fn clear_token(&self) -> Result<(), ClientError> {
        self.commands.send(Command::ClearToken).map_err(|_| ClientError::Stopped)
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Transports opened so far, including failed attempts.
    pub fn connect_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Tear down: cancel any reconnect, close the transport, and wait for the
    /// task to exit.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "connection manager task failed");
        }
    }
}

struct Driver {
    machine: ChannelMachine,
    config: ClientConfig,
    invalidator: Arc<dyn CacheInvalidator>,
    alerts: Arc<dyn AlertSink>,
    state_tx: watch::Sender<ChannelState>,
    attempts: Arc<AtomicU64>,
    transport: Option<WsStream>,
    connecting: Option<Connecting>,
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    #[tracing::instrument(skip_all, name = "push_channel")]
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let event = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::SetToken(token)) => ChannelEvent::TokenAvailable(token),
                    Some(Command::ClearToken) => ChannelEvent::TokenCleared,
                    Some(Command::Shutdown) | None => {
                        self.apply(ChannelEvent::Teardown).await;
                        break;
                    }
                },
                result = poll_connecting(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(ws) => {
                            self.transport = Some(ws);
                            ChannelEvent::TransportOpened
                        }
                        Err(e) => {
                            warn!(error = %e, "push channel connect failed");
                            ChannelEvent::TransportClosed { code: None }
                        }
                    }
                },
                frame = next_frame(&mut self.transport) => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = handle_text(text.as_str(), self.invalidator.as_ref(), self.alerts.as_ref());
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        self.transport = None;
                        let code = frame.map(|f| u16::from(f.code));
                        info!(code, "push channel closed by server");
                        ChannelEvent::TransportClosed { code }
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        self.transport = None;
                        debug!(error = %e, "push channel read error");
                        ChannelEvent::TransportClosed { code: None }
                    }
                    None => {
                        self.transport = None;
                        ChannelEvent::TransportClosed { code: None }
                    }
                },
                () = wait_reconnect(&mut self.reconnect) => {
                    self.reconnect = None;
                    ChannelEvent::ReconnectTimerFired
                },
            };
            self.apply(event).await;
        }
        debug!("connection manager stopped");
    }

    async fn apply(&mut self, event: ChannelEvent) {
        for effect in self.machine.handle(event) {
            match effect {
                Effect::OpenTransport { token } => {
                    let _ = self.attempts.fetch_add(1, Ordering::Relaxed);
                    let url = self.config.ws_url(&token);
                    self.connecting = Some(Box::pin(async move { connect_async(url).await.map(|(ws, _)| ws) }));
                }
                Effect::ScheduleReconnect(delay) => {
                    debug!(?delay, "reconnect scheduled");
                    self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelReconnect => self.reconnect = None,
                Effect::CloseTransport => {
                    self.connecting = None;
                    if let Some(mut ws) = self.transport.take() {
                        let _ = ws.close(None).await;
                    }
                }
            }
        }
        let _ = self.state_tx.send_replace(self.machine.state());
    }
}

async fn poll_connecting(connecting: &mut Option<Connecting>) -> Result<WsStream, tungstenite::Error> {
    match connecting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(transport: &mut Option<WsStream>) -> Option<Result<Message, tungstenite::Error>> {
    match transport {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_reconnect(reconnect: &mut Option<Pin<Box<Sleep>>>) {
    match reconnect {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

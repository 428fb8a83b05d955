//! Connection manager.
//!
//! A single actor task owns the transport, the connection status, the
//! reconnect timer and the heartbeat timer. Everything else talks to it
//! through [`Command`]s, so each of these resources has exactly one writer.
//!
//! ## State machine
//!
//! ```text
//! disconnected --connect()--> connecting --open ok--> connected
//!                                  |                     |
//!                             open failed         transport error
//!                                  v                     v
//!                                error --------------> error
//!                                  |   transport close   |
//!                                  +----> disconnected <-+
//!                                          |
//!                          attempts < max and still authenticated:
//!                          reconnect after the fixed delay
//! ```
//!
//! `disconnect()` moves any state to `disconnected` and cancels a pending
//! reconnect.

use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::event::{ControlFrame, RealtimeEvent};
use crate::router::EventRouter;
use crate::status::ConnectionStatus;
use crate::transport::{Connector, TransportEvent, TransportLink};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Requests handled by the connection manager.
#[derive(Debug)]
pub(crate) enum Command {
    /// Replace the authenticated user. `None` means signed out.
    SetIdentity(Option<String>),
    /// Open the transport if allowed.
    Connect,
    /// Close the transport and cancel any reconnect.
    Disconnect,
    /// Send an application event if the transport is open.
    Emit(RealtimeEvent),
    /// Disconnect, drop all subscriptions and stop the actor.
    Shutdown(Option<oneshot::Sender<()>>),
}

/// Connection statistics.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Transports opened successfully.
    pub connections_opened: u64,
    /// Automatic reconnects scheduled.
    pub reconnects_scheduled: u64,
    /// Current consecutive reconnect attempt counter.
    pub reconnect_attempts: u32,
    /// Valid events received.
    pub events_received: u64,
    /// Inbound frames dropped because they did not parse.
    pub malformed_frames: u64,
    /// Frames handed to the transport.
    pub frames_sent: u64,
}

/// Receiving ends handed to the client handle.
pub(crate) struct ManagerChannels {
    pub commands: mpsc::UnboundedSender<Command>,
    pub status: watch::Receiver<ConnectionStatus>,
    pub last_event: watch::Receiver<Option<RealtimeEvent>>,
    pub stats: Arc<RwLock<ConnectionStats>>,
}

type PendingOpen = BoxFuture<'static, (String, Result<TransportLink, RealtimeError>)>;

enum Input {
    Command(Command),
    Opened(String, Result<TransportLink, RealtimeError>),
    Transport(TransportEvent),
    ReconnectDue,
    Heartbeat,
}

/// Owns the single transport and its lifecycle.
pub(crate) struct ConnectionManager {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    router: EventRouter,
    commands: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<ConnectionStatus>,
    last_event_tx: watch::Sender<Option<RealtimeEvent>>,
    stats: Arc<RwLock<ConnectionStats>>,
    identity: Option<String>,
    link: Option<TransportLink>,
    opening: Option<PendingOpen>,
    reconnect_at: Option<Instant>,
    reconnect_attempts: u32,
    heartbeat: Option<Interval>,
}

impl ConnectionManager {
    /// Create a manager and the channels used to drive and observe it.
    pub(crate) fn new(
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        router: EventRouter,
    ) -> (Self, ManagerChannels) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (last_event_tx, last_event_rx) = watch::channel(None);
        let stats = Arc::new(RwLock::new(ConnectionStats::default()));

        let manager = Self {
            config,
            connector,
            router,
            commands,
            status_tx,
            last_event_tx,
            stats: stats.clone(),
            identity: None,
            link: None,
            opening: None,
            reconnect_at: None,
            reconnect_attempts: 0,
            heartbeat: None,
        };

        let channels = ManagerChannels {
            commands: command_tx,
            status: status_rx,
            last_event: last_event_rx,
            stats,
        };

        (manager, channels)
    }

    /// Process inputs until shut down or every command sender is gone.
    pub(crate) async fn run(mut self) {
        let ack = loop {
            let input = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => Input::Command(command),
                    None => Input::Command(Command::Shutdown(None)),
                },
                (user_id, result) = poll_open(&mut self.opening) => Input::Opened(user_id, result),
                event = recv_transport(&mut self.link) => Input::Transport(event),
                _ = sleep_until_due(self.reconnect_at) => Input::ReconnectDue,
                _ = tick(&mut self.heartbeat) => Input::Heartbeat,
            };

            match input {
                Input::Command(Command::Shutdown(done)) => {
                    self.disconnect();
                    self.router.clear();
                    break done;
                }
                Input::Command(command) => self.handle_command(command),
                Input::Opened(user_id, result) => self.on_opened(user_id, result),
                Input::Transport(event) => self.on_transport(event),
                Input::ReconnectDue => {
                    self.reconnect_at = None;
                    debug!(attempt = self.reconnect_attempts, "Reconnect timer fired");
                    self.connect();
                }
                Input::Heartbeat => self.heartbeat(),
            }
        };

        drop(self);
        debug!("Connection manager stopped");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetIdentity(user_id) => {
                self.identity = user_id.filter(|id| !id.is_empty());
            }
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Emit(event) => self.emit(event),
            Command::Shutdown(_) => {}
        }
    }

    fn connect(&mut self) {
        if self.link.is_some() || self.opening.is_some() {
            debug!("Connect ignored: already connected or connecting");
            return;
        }
        let Some(user_id) = self.identity.clone() else {
            debug!("Connect ignored: no authenticated user");
            return;
        };

        self.reconnect_at = None;

        let url = match self.config.endpoint_url(&user_id) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot build endpoint url");
                self.set_status(ConnectionStatus::Error);
                return;
            }
        };

        self.set_status(ConnectionStatus::Connecting);
        info!(user_id = %user_id, url = %url, "Connecting");

        let connector = self.connector.clone();
        self.opening = Some(Box::pin(async move {
            let result = connector.open(&url).await;
            (user_id, result)
        }));
    }

    fn on_opened(&mut self, user_id: String, result: Result<TransportLink, RealtimeError>) {
        match result {
            Ok(link) => {
                self.link = Some(link);
                self.set_attempts(0);
                self.set_status(ConnectionStatus::Connected);
                self.stats.write().connections_opened += 1;
                info!(user_id = %user_id, "Connected");

                self.send_frame(&ControlFrame::auth(user_id));

                let period = self.config.heartbeat_interval();
                let mut heartbeat = interval_at(Instant::now() + period, period);
                heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(heartbeat);
            }
            Err(e) => {
                warn!(error = %e, "Failed to open transport");
                self.set_status(ConnectionStatus::Error);
                self.on_closed();
            }
        }
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(text) => match RealtimeEvent::from_json(&text) {
                Ok(event) => {
                    self.stats.write().events_received += 1;
                    self.last_event_tx.send_replace(Some(event.clone()));
                    self.router.dispatch(&event);
                }
                Err(e) => {
                    self.stats.write().malformed_frames += 1;
                    debug!(error = %e, "Dropping malformed frame");
                }
            },
            TransportEvent::Error(message) => {
                warn!(error = %message, "Transport error");
                self.set_status(ConnectionStatus::Error);
            }
            TransportEvent::Closed => {
                info!("Transport closed");
                self.on_closed();
            }
        }
    }

    /// Close not requested by `disconnect()`.
    fn on_closed(&mut self) {
        self.link = None;
        self.set_status(ConnectionStatus::Disconnected);

        if self.identity.is_none() {
            debug!("Not reconnecting: no authenticated user");
            return;
        }

        let max = self.config.max_reconnect_attempts;
        if self.reconnect_attempts < max {
            self.set_attempts(self.reconnect_attempts + 1);
            let delay = self.config.reconnect_delay();
            self.reconnect_at = Some(Instant::now() + delay);
            self.stats.write().reconnects_scheduled += 1;
            info!(
                attempt = self.reconnect_attempts,
                max = max,
                delay_ms = delay.as_millis() as u64,
                "Reconnect scheduled"
            );
        } else {
            warn!(attempts = self.reconnect_attempts, "Reconnect attempts exhausted");
        }
    }

    fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.opening = None;
        let was_open = self.link.take().is_some();
        self.set_attempts(0);
        self.set_status(ConnectionStatus::Disconnected);

        if was_open {
            info!("Disconnected");
        }
    }

    fn emit(&mut self, mut event: RealtimeEvent) {
        if !self.link.as_ref().is_some_and(TransportLink::is_open) {
            debug!(event_type = %event.event_type, "Emit dropped: not connected");
            return;
        }
        if event.user_id.is_none() {
            event.user_id = self.identity.clone();
        }
        self.send_frame(&event);
    }

    fn heartbeat(&mut self) {
        if self.link.as_ref().is_some_and(TransportLink::is_open) {
            self.send_frame(&ControlFrame::ping());
        }
    }

    fn send_frame<T: Serialize>(&self, frame: &T) {
        let Some(link) = self.link.as_ref() else {
            return;
        };

        let sent = serde_json::to_string(frame)
            .map_err(RealtimeError::from)
            .and_then(|json| link.send(json));

        match sent {
            Ok(()) => self.stats.write().frames_sent += 1,
            Err(e) => debug!(error = %e, "Failed to send frame"),
        }
    }

    /// Record a status change. Leaving `Connected` stops the heartbeat.
    fn set_status(&mut self, status: ConnectionStatus) {
        if status != ConnectionStatus::Connected {
            self.heartbeat = None;
        }
        let previous = *self.status_tx.borrow();
        if previous != status {
            self.status_tx.send_replace(status);
            debug!(from = %previous, to = %status, "Connection status changed");
        }
    }

    fn set_attempts(&mut self, attempts: u32) {
        self.reconnect_attempts = attempts;
        self.stats.write().reconnect_attempts = attempts;
    }
}

async fn poll_open(
    opening: &mut Option<PendingOpen>,
) -> (String, Result<TransportLink, RealtimeError>) {
    match opening.as_mut() {
        Some(future) => {
            let output = future.await;
            *opening = None;
            output
        }
        None => pending().await,
    }
}

async fn recv_transport(link: &mut Option<TransportLink>) -> TransportEvent {
    match link.as_mut() {
        // A dropped sender means the transport went away.
        Some(link) => link.inbound.recv().await.unwrap_or(TransportEvent::Closed),
        None => pending().await,
    }
}

async fn sleep_until_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

//! Client handle used by application code.

use crate::config::RealtimeConfig;
use crate::connection::{Command, ConnectionManager, ConnectionStats};
use crate::event::RealtimeEvent;
use crate::router::{EventRouter, Subscription};
use crate::status::ConnectionStatus;
use crate::transport::{Connector, WebSocketConnector};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

/// Handle to a running real-time hub.
///
/// The handle is cheap to clone. Every method returns immediately; work is
/// carried out by the connection manager task, and transport failures are
/// only visible through [`connection_status`](Self::connection_status).
///
/// # Example
///
/// ```rust,no_run
/// use talentchain_realtime::{EventKind, RealtimeClient, RealtimeConfig};
///
/// # async fn run() {
/// let client = RealtimeClient::new(RealtimeConfig::default());
///
/// let subscription = client.subscribe(EventKind::SkillCreated, |event| {
///     println!("skill created: {}", event.data);
/// });
///
/// client.set_identity(Some("alice".to_string()));
/// client.connect();
/// client.emit(EventKind::PoolApplied, serde_json::json!({"pool": 7}));
///
/// subscription.unsubscribe();
/// client.shutdown().await;
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    router: EventRouter,
    status: watch::Receiver<ConnectionStatus>,
    last_event: watch::Receiver<Option<RealtimeEvent>>,
    stats: Arc<RwLock<ConnectionStats>>,
}

impl RealtimeClient {
    /// Start a hub backed by a WebSocket transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: RealtimeConfig) -> Self {
        Self::spawn(config, WebSocketConnector)
    }

    /// Start a hub using `connector` to open transports.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<C: Connector>(config: RealtimeConfig, connector: C) -> Self {
        let router = EventRouter::new();
        let (manager, channels) =
            ConnectionManager::new(config, Arc::new(connector), router.clone());
        tokio::spawn(manager.run());

        Self {
            commands: channels.commands,
            router,
            status: channels.status,
            last_event: channels.last_event,
            stats: channels.stats,
        }
    }

    /// Set or clear the authenticated user used to connect.
    pub fn set_identity(&self, user_id: Option<String>) {
        self.send(Command::SetIdentity(user_id));
    }

    /// Open the connection.
    ///
    /// No-op while connected or connecting, or without an authenticated user.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Send an application event, stamped now and tagged with the current user.
    ///
    /// Silently dropped unless the connection is open. Events are never
    /// queued for later delivery.
    pub fn emit(&self, event_type: impl Into<String>, data: serde_json::Value) {
        self.send(Command::Emit(RealtimeEvent::new(event_type, data)));
    }

    /// Register `callback` for `event_type`, or for all events with `"*"`.
    pub fn subscribe<F>(&self, event_type: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.router.subscribe(event_type, callback)
    }

    /// Stream of every dispatched event.
    pub fn events(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.router.events()
    }

    /// The router events are dispatched through.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    /// Current connection status.
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Most recent valid event received.
    pub fn last_event(&self) -> Option<RealtimeEvent> {
        self.last_event.borrow().clone()
    }

    /// Get connection statistics.
    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Disconnect, drop all subscriptions and stop the hub.
    ///
    /// Resolves once the connection manager has stopped.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(Some(done_tx))).is_err() {
            self.router.clear();
            return;
        }
        let _ = done_rx.await;
    }

    /// Non-blocking [`shutdown`](Self::shutdown), usable from `Drop`.
    pub fn teardown(&self) {
        self.router.clear();
        self.send(Command::Shutdown(None));
    }

    /// Whether the hub has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Real-time hub already stopped");
        }
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("status", &self.connection_status())
            .field("router", &self.router)
            .finish()
    }
}

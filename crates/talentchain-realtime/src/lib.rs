//! # TalentChain Real-time
//!
//! Client-side real-time event hub for the TalentChain dashboard.
//!
//! The hub keeps one WebSocket connection to the push-event server, routes
//! incoming events to subscribers by event type and lets any part of the
//! application subscribe or emit without knowing about the transport.
//!
//! ## Features
//!
//! - **Connection Manager**: connect, authenticate, heartbeat and bounded
//!   fixed-delay reconnection, all owned by a single task
//! - **Event Router**: per-type and wildcard (`*`) subscriptions with
//!   panic-isolated dispatch
//! - **Emitter**: best-effort outbound events while connected
//! - **Lifecycle Binder**: connect and disconnect from an auth signal
//!
//! ## Example
//!
//! ```rust,no_run
//! use talentchain_realtime::{
//!     AuthState, EventKind, LifecycleBinder, RealtimeClient, RealtimeConfig,
//! };
//! use tokio::sync::watch;
//!
//! # async fn run() {
//! let client = RealtimeClient::new(RealtimeConfig::default());
//!
//! let subscription = client.subscribe(EventKind::SkillCreated, |event| {
//!     println!("new skill: {}", event.data);
//! });
//!
//! // The session provider publishes auth changes; the binder follows them.
//! let (auth_tx, auth_rx) = watch::channel(AuthState::anonymous());
//! let binder = LifecycleBinder::spawn(client.clone(), auth_rx);
//! auth_tx.send_replace(AuthState::authenticated("alice"));
//!
//! // ...
//!
//! subscription.unsubscribe();
//! binder.shutdown().await;
//! # }
//! ```
//!
//! ## Wire Protocol
//!
//! ### Client -> Server
//!
//! ```json
//! // Once, right after the connection opens
//! {"type": "auth", "user_id": "alice", "timestamp": 1700000000000}
//!
//! // Every 30 seconds while connected
//! {"type": "ping", "timestamp": 1700000030000}
//!
//! // Application events
//! {"type": "pool_applied", "data": {"pool": 7}, "timestamp": 1700000000000, "userId": "alice"}
//! ```
//!
//! ### Server -> Client
//!
//! ```json
//! {"type": "skill_created", "data": {"id": 1}, "timestamp": 1700000000000, "userId": "alice"}
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────────────────────┐
//! │RealtimeClient├────────────►│      ConnectionManager       │
//! │ (clonable)   │◄────────────┤ transport, status, timers    │
//! └──────┬───────┘ status/last └──────┬──────────────▲────────┘
//!        │ subscribe                  │ dispatch     │ TransportLink
//! ┌──────▼───────┐                    │       ┌──────┴────────┐
//! │ EventRouter  │◄───────────────────┘       │  Connector    │
//! │ type -> [cb] │                            │ (WebSocket)   │
//! └──────────────┘                            └───────────────┘
//! ```

pub mod binder;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod router;
pub mod status;
pub mod transport;

// Re-export main types
pub use binder::{AuthState, LifecycleBinder};
pub use client::RealtimeClient;
pub use config::RealtimeConfig;
pub use connection::ConnectionStats;
pub use error::RealtimeError;
pub use event::{now_millis, ControlFrame, EventKind, RealtimeEvent, WILDCARD};
pub use router::{Callback, EventRouter, RouterStats, Subscription};
pub use status::ConnectionStatus;
pub use transport::{Connector, TransportEvent, TransportLink, WebSocketConnector};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api() {
        // Test that main types are accessible
        let router = EventRouter::new();
        assert!(router.is_empty());
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(EventKind::all().len(), 6);
    }
}

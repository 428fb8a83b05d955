//! Connection status reported by the connection manager.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the hub's single transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No transport; initial state.
    #[default]
    Disconnected,
    /// An open is in flight.
    Connecting,
    /// Transport is open and authenticated.
    Connected,
    /// The last attempt failed or the transport reported an error.
    Error,
}

impl ConnectionStatus {
    /// Whether the transport is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

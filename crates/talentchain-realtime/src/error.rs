//! Error types for the real-time hub.

use thiserror::Error;

/// Errors that can occur inside the real-time hub.
///
/// These never cross the [`RealtimeClient`](crate::RealtimeClient) boundary;
/// the client turns them into status changes or drops them with a log record.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Endpoint URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Inbound frame is not a valid event.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport failed to open or broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl From<url::ParseError> for RealtimeError {
    fn from(err: url::ParseError) -> Self {
        RealtimeError::InvalidUrl(err.to_string())
    }
}

impl From<::config::ConfigError> for RealtimeError {
    fn from(err: ::config::ConfigError) -> Self {
        RealtimeError::Config(err.to_string())
    }
}

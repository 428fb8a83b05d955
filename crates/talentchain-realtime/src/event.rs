//! Real-time event types and wire frames.

use crate::error::RealtimeError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Subscription key that matches every event type.
pub const WILDCARD: &str = "*";

/// A real-time event pushed by the server or emitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// Event type identifier.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload data. Not validated by the hub.
    #[serde(default)]
    pub data: serde_json::Value,

    /// Milliseconds since the Unix epoch, set by the sender.
    ///
    /// Fractional values are truncated on input.
    #[serde(deserialize_with = "deserialize_millis")]
    pub timestamp: u64,

    /// Originating or target user.
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl RealtimeEvent {
    /// Create a new event stamped with the current time.
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: now_millis(),
            user_id: None,
        }
    }

    /// Set the user identifier.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Parse an inbound text frame.
    ///
    /// Fails on malformed JSON and on a missing or empty `type`.
    pub fn from_json(text: &str) -> Result<Self, RealtimeError> {
        let event: RealtimeEvent = serde_json::from_str(text)?;
        if event.event_type.is_empty() {
            return Err(RealtimeError::InvalidEvent(
                "event type cannot be empty".to_string(),
            ));
        }
        Ok(event)
    }

    /// The known domain kind of this event, if any.
    pub fn kind(&self) -> Option<EventKind> {
        self.event_type.parse().ok()
    }
}

/// Domain notifications the dashboard reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A skill token was minted.
    SkillCreated,
    /// A skill token level or metadata changed.
    SkillUpdated,
    /// A job pool was opened.
    PoolCreated,
    /// A candidate applied to a pool.
    PoolApplied,
    /// A pool matched a candidate.
    PoolMatched,
    /// An on-chain transaction reached confirmation.
    TransactionConfirmed,
}

impl EventKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SkillCreated => "skill_created",
            EventKind::SkillUpdated => "skill_updated",
            EventKind::PoolCreated => "pool_created",
            EventKind::PoolApplied => "pool_applied",
            EventKind::PoolMatched => "pool_matched",
            EventKind::TransactionConfirmed => "transaction_confirmed",
        }
    }

    /// Get all event kinds.
    pub fn all() -> Vec<EventKind> {
        vec![
            EventKind::SkillCreated,
            EventKind::SkillUpdated,
            EventKind::PoolCreated,
            EventKind::PoolApplied,
            EventKind::PoolMatched,
            EventKind::TransactionConfirmed,
        ]
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::all()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RealtimeError::InvalidEvent(format!("unknown event kind: {}", s)))
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Control frames the client sends on its own behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Identifies the user right after the connection opens.
    Auth { user_id: String, timestamp: u64 },
    /// Keepalive.
    Ping { timestamp: u64 },
}

impl ControlFrame {
    /// Auth frame for `user_id`, stamped now.
    pub fn auth(user_id: impl Into<String>) -> Self {
        ControlFrame::Auth {
            user_id: user_id.into(),
            timestamp: now_millis(),
        }
    }

    /// Ping frame, stamped now.
    pub fn ping() -> Self {
        ControlFrame::Ping {
            timestamp: now_millis(),
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Accept any non-negative JSON number as epoch milliseconds.
fn deserialize_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Number::deserialize(deserializer)?;
    if let Some(millis) = value.as_u64() {
        return Ok(millis);
    }
    match value.as_f64() {
        Some(millis) if millis.is_finite() && millis >= 0.0 => Ok(millis.trunc() as u64),
        _ => Err(serde::de::Error::custom(format!("invalid timestamp: {value}"))),
    }
}

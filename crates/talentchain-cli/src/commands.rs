//! CLI command implementations.

use std::time::Duration;
use talentchain_realtime::{
    AuthState, LifecycleBinder, RealtimeClient, RealtimeConfig, RealtimeError, RealtimeEvent,
    WILDCARD,
};
use thiserror::Error;
use tokio::sync::watch;

/// How long `emit` waits after sending so the socket can flush.
const EMIT_LINGER: Duration = Duration::from_millis(250);

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error("invalid event data: {0}")]
    InvalidData(#[from] serde_json::Error),

    #[error("not connected after {0}s (last status: {1})")]
    ConnectTimeout(u64, String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Print received events as JSON lines until Ctrl+C.
pub async fn listen(config: RealtimeConfig, user_id: &str, events: &[String]) -> Result<()> {
    let client = RealtimeClient::new(config);

    let types: Vec<String> = if events.is_empty() {
        vec![WILDCARD.to_string()]
    } else {
        events.to_vec()
    };
    for event_type in types {
        let _subscription = client.subscribe(event_type, print_event);
    }

    let mut status = client.status_changes();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            tracing::info!(status = %current, "Connection status");
        }
    });

    let (_auth_tx, auth_rx) = watch::channel(AuthState::authenticated(user_id));
    let binder = LifecycleBinder::spawn(client, auth_rx);

    tracing::info!(user_id = %user_id, "Listening for events. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    let stats = binder.client().stats();
    binder.shutdown().await;
    tracing::info!(
        events = stats.events_received,
        malformed = stats.malformed_frames,
        reconnects = stats.reconnects_scheduled,
        "Stopped"
    );
    Ok(())
}

/// Connect, send one event and disconnect.
pub async fn emit(
    config: RealtimeConfig,
    user_id: &str,
    event_type: &str,
    data: Option<&str>,
    timeout_secs: u64,
) -> Result<()> {
    let data: serde_json::Value = match data {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::Value::Null,
    };

    let client = RealtimeClient::new(config);
    client.set_identity(Some(user_id.to_string()));
    client.connect();

    let mut status = client.status_changes();
    let connected = matches!(
        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            status.wait_for(|s| s.is_connected()),
        )
        .await,
        Ok(Ok(_))
    );

    if !connected {
        let last = client.connection_status().to_string();
        client.shutdown().await;
        return Err(CliError::ConnectTimeout(timeout_secs, last));
    }

    client.emit(event_type, data);
    tracing::info!(event_type = %event_type, user_id = %user_id, "Event emitted");

    client.shutdown().await;
    // The writer task drains queued frames after the link is dropped.
    tokio::time::sleep(EMIT_LINGER).await;
    Ok(())
}

/// Print the effective configuration.
pub fn show_config(config: &RealtimeConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_event(event: &RealtimeEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_rejects_invalid_data() {
        let result = emit(RealtimeConfig::default(), "alice", "skill_created", Some("{"), 1).await;
        assert!(matches!(result, Err(CliError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_emit_times_out_without_server() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = RealtimeConfig {
            base_url: format!("ws://127.0.0.1:{port}"),
            ..RealtimeConfig::default()
        };
        let result = emit(config, "alice", "skill_created", None, 1).await;
        assert!(matches!(result, Err(CliError::ConnectTimeout(1, _))));
    }

    #[test]
    fn test_show_config() {
        assert!(show_config(&RealtimeConfig::default()).is_ok());
    }
}

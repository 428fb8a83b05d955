//! Hub configuration.

use crate::error::RealtimeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "TALENTCHAIN_REALTIME";

/// Query parameter carrying the authenticated user.
pub const USER_QUERY_PARAM: &str = "user_id";

/// Configuration for the real-time hub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Base address of the push-event server.
    pub base_url: String,
    /// Endpoint path appended to the base address.
    pub path: String,
    /// Delay before each automatic reconnect, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Consecutive automatic reconnects before giving up.
    pub max_reconnect_attempts: u32,
    /// Keepalive period while connected, in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:8000".to_string(),
            path: "/ws".to_string(),
            reconnect_delay_ms: 3000,
            max_reconnect_attempts: 5,
            heartbeat_interval_ms: 30_000,
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from defaults, an optional file, then the environment.
    ///
    /// Environment variables use the [`ENV_PREFIX`] prefix and a double
    /// underscore separator, e.g. `TALENTCHAIN_REALTIME__BASE_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self, RealtimeError> {
        // Missing keys fall back to `Default` through `#[serde(default)]`.
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }

        let config: RealtimeConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check that values are usable.
    pub fn validate(&self) -> Result<(), RealtimeError> {
        let url = Url::parse(&self.base_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RealtimeError::Config(format!(
                "base_url must use ws or wss: {}",
                self.base_url
            )));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(RealtimeError::Config(
                "reconnect_delay_ms must be positive".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(RealtimeError::Config(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint for `user_id`: base address, path and the url-encoded user.
    pub fn endpoint_url(&self, user_id: &str) -> Result<Url, RealtimeError> {
        let base = self.base_url.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{}/{}", base, path))?;
        url.query_pairs_mut().append_pair(USER_QUERY_PARAM, user_id);
        Ok(url)
    }

    /// Delay before each automatic reconnect.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Keepalive period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RealtimeConfig::default();
        assert_eq!(config.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_url_encodes_user() {
        let config = RealtimeConfig::default();
        let url = config.endpoint_url("alice@example.com/1").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/ws?user_id=alice%40example.com%2F1"
        );
    }

    #[test]
    fn test_endpoint_url_joins_slashes() {
        let config = RealtimeConfig {
            base_url: "wss://events.example.com/".to_string(),
            path: "realtime".to_string(),
            ..RealtimeConfig::default()
        };
        let url = config.endpoint_url("bob").unwrap();
        assert_eq!(url.as_str(), "wss://events.example.com/realtime?user_id=bob");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let http = RealtimeConfig {
            base_url: "http://localhost:8000".to_string(),
            ..RealtimeConfig::default()
        };
        assert!(matches!(http.validate(), Err(RealtimeError::Config(_))));

        let garbage = RealtimeConfig {
            base_url: "not a url".to_string(),
            ..RealtimeConfig::default()
        };
        assert!(matches!(garbage.validate(), Err(RealtimeError::InvalidUrl(_))));

        let zero = RealtimeConfig {
            heartbeat_interval_ms: 0,
            ..RealtimeConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "base_url = \"wss://push.example.com\"").unwrap();
        writeln!(file, "max_reconnect_attempts = 2").unwrap();

        let config = RealtimeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.base_url, "wss://push.example.com");
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.path, "/ws");
    }

    #[test]
    fn test_load_defaults_without_file() {
        let config = RealtimeConfig::load(None).unwrap();
        assert_eq!(config.path, "/ws");
    }
}

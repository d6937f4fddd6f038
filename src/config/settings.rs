//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::backoff::ReconnectPolicy;
use crate::mcp::bridge::BridgeConfig;

/// Longest accepted reconnect delay, in milliseconds (one day).
pub const MAX_RECONNECT_DELAY_MS: u64 = 86_400_000;

/// Longest accepted keepalive interval, in seconds (one day).
pub const MAX_KEEPALIVE_INTERVAL_SECS: u64 = 86_400;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Connection settings.
    #[serde(default)]
    pub bridge: ConnectionConfig,

    /// Reconnection backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Keepalive settings.
    #[serde(default)]
    pub keepalive: KeepaliveConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = &self.bridge.endpoint;
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConfigError::ValidationError {
                message: format!("Invalid endpoint '{endpoint}'. Must start with ws:// or wss://"),
            });
        }

        if self.bridge.default_instance_id.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "default_instance_id cannot be empty".to_string(),
            });
        }

        if self.bridge.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "bridge.connect_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "reconnect.base_delay_ms must be greater than zero".to_string(),
            });
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "reconnect.max_delay_ms ({}) must not be below base_delay_ms ({})",
                    self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
                ),
            });
        }

        if self.reconnect.max_delay_ms > MAX_RECONNECT_DELAY_MS {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "reconnect.max_delay_ms ({}) must not exceed {MAX_RECONNECT_DELAY_MS}",
                    self.reconnect.max_delay_ms
                ),
            });
        }

        if self.keepalive.interval_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "keepalive.interval_secs must be greater than zero".to_string(),
            });
        }

        if self.keepalive.interval_secs > MAX_KEEPALIVE_INTERVAL_SECS {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "keepalive.interval_secs ({}) must not exceed {MAX_KEEPALIVE_INTERVAL_SECS}",
                    self.keepalive.interval_secs
                ),
            });
        }

        Ok(())
    }

    /// Handshake limit for the WebSocket connector.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.connect_timeout_secs)
    }

    /// Builds the runtime bridge configuration from the file settings.
    #[must_use]
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new(&self.bridge.endpoint)
            .with_default_instance_id(&self.bridge.default_instance_id)
            .with_reconnect(ReconnectPolicy::new(
                Duration::from_millis(self.reconnect.base_delay_ms),
                Duration::from_millis(self.reconnect.max_delay_ms),
            ))
            .with_keepalive_interval(Duration::from_secs(self.keepalive.interval_secs))
            .with_enabled(self.bridge.enabled)
            .with_server_name(&self.bridge.server_name);

        if let Some(ref version) = self.bridge.server_version {
            config = config.with_server_version(version);
        }

        config
    }
}

/// Where and how the bridge connects.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// WebSocket endpoint without the instance path segment.
    /// Default: "ws://localhost:3003"
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Fixed instance identifier. When absent the identifier is derived
    /// from the logged-in account.
    #[serde(default)]
    pub instance_id: Option<String>,

    /// Identifier used when the instance cannot be resolved.
    #[serde(default = "default_instance_id")]
    pub default_instance_id: String,

    /// Whether the bridge connects on startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds allowed for the TCP connect plus WebSocket upgrade.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Name reported in the `initialize` response.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Version reported in the `initialize` response (defaults to the crate version).
    #[serde(default)]
    pub server_version: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            instance_id: None,
            default_instance_id: default_instance_id(),
            enabled: default_true(),
            connect_timeout_secs: default_connect_timeout_secs(),
            server_name: default_server_name(),
            server_version: None,
        }
    }
}

fn default_endpoint() -> String {
    crate::mcp::bridge::DEFAULT_ENDPOINT.to_string()
}

fn default_instance_id() -> String {
    crate::mcp::instance::DEFAULT_INSTANCE_ID.to_string()
}

fn default_server_name() -> String {
    crate::mcp::protocol::SERVER_NAME.to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

/// Reconnection backoff configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for the reconnection delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

/// Keepalive configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeepaliveConfig {
    /// Seconds between keepalive pings while connected.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

const fn default_interval_secs() -> u64 {
    20
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge.endpoint, "ws://localhost:3003");
        assert!(config.bridge.enabled);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "bridge": {
                "endpoint": "ws://127.0.0.1:4000",
                "instance_id": "work-profile",
                "default_instance_id": "fallback",
                "enabled": false,
                "connect_timeout_secs": 3,
                "server_name": "my-host",
                "server_version": "9.9.9"
            },
            "reconnect": {
                "base_delay_ms": 500,
                "max_delay_ms": 8000
            },
            "keepalive": {
                "interval_secs": 5
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge.instance_id.as_deref(), Some("work-profile"));
        assert_eq!(config.bridge.default_instance_id, "fallback");
        assert!(!config.bridge.enabled);
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.reconnect.base_delay_ms, 500);
        assert_eq!(config.keepalive.interval_secs, 5);
        assert_eq!(config.logging.level, "debug");

        let bridge = config.bridge_config();
        assert_eq!(bridge.url_for("abc"), "ws://127.0.0.1:4000/abc");
        assert_eq!(bridge.reconnect.max_delay(), Duration::from_millis(8000));
        assert_eq!(bridge.keepalive_interval, Duration::from_secs(5));
        assert_eq!(bridge.server_version, "9.9.9");
        assert!(!bridge.enabled);
    }

    #[test]
    fn reconnect_config_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay_ms, 1_000);
        assert_eq!(config.max_delay_ms, 30_000);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_non_websocket_endpoint() {
        let json = r#"{ "bridge": { "endpoint": "http://localhost:3003" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_inverted_delays() {
        let json = r#"{ "reconnect": { "base_delay_ms": 5000, "max_delay_ms": 1000 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_keepalive() {
        let json = r#"{ "keepalive": { "interval_secs": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_huge_keepalive() {
        let json = r#"{ "keepalive": { "interval_secs": 18446744073709551615 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());

        let json = r#"{ "keepalive": { "interval_secs": 86400 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reject_zero_connect_timeout() {
        let json = r#"{ "bridge": { "connect_timeout_secs": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_huge_max_delay() {
        let json = r#"{ "reconnect": { "max_delay_ms": 18446744073709551615 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}

//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial: missing fields keep their compiled default.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay hub.
///
/// ```json
/// {
///   "server": { "port": 8787 },
///   "hub": { "name": "global" },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network and transport settings.
    pub server: ServerSettings,
    /// Broadcast hub settings.
    pub hub: HubSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values that would leave the hub unable to run.
    pub fn validate(&self) -> Result<()> {
        if self.hub.name.trim().is_empty() {
            return Err(SettingsError::invalid("hub.name", "must not be empty"));
        }
        if self.hub.mailbox_capacity == 0 {
            return Err(SettingsError::invalid(
                "hub.mailboxCapacity",
                "must be at least 1",
            ));
        }
        if self.server.send_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "server.sendTimeoutMs",
                "must be greater than 0",
            ));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "server.heartbeatIntervalMs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Server network and transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` auto-assigns).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Upper bound for a single socket write in milliseconds.
    pub send_timeout_ms: u64,
    /// Interval between server-initiated Ping frames in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// How long graceful shutdown waits for open tasks in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            max_message_size: 1024 * 1024,
            send_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Broadcast hub settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Logical name all WebSocket traffic is routed to.
    pub name: String,
    /// Capacity of the coordinator mailbox.
    pub mailbox_capacity: usize,
    /// Reason text sent with the reciprocal normal-closure frame.
    pub close_reason: String,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            name: "global".to_string(),
            mailbox_capacity: 1024,
            close_reason: "hub is closing WebSocket".to_string(),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse a format name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = RelaySettings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 8787);
        assert_eq!(s.hub.name, "global");
        assert_eq!(s.hub.close_reason, "hub is closing WebSocket");
        assert_eq!(s.logging.level, "info");
        assert_eq!(s.logging.format, LogFormat::Compact);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(RelaySettings::default().validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert!(json["server"]["sendTimeoutMs"].is_number());
        assert!(json["hub"]["mailboxCapacity"].is_number());
        assert_eq!(json["logging"]["format"], "compact");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s: RelaySettings = serde_json::from_str(r#"{"hub":{"name":"lobby"}}"#).unwrap();
        assert_eq!(s.hub.name, "lobby");
        assert_eq!(s.hub.mailbox_capacity, 1024);
        assert_eq!(s.server.port, 8787);
    }

    #[test]
    fn empty_hub_name_rejected() {
        let mut s = RelaySettings::default();
        s.hub.name = "  ".into();
        let err = s.validate().unwrap_err();
        assert_eq!(err.field(), Some("hub.name"));
    }

    #[test]
    fn zero_send_timeout_rejected() {
        let mut s = RelaySettings::default();
        s.server.send_timeout_ms = 0;
        let err = s.validate().unwrap_err();
        assert_eq!(err.field(), Some("server.sendTimeoutMs"));
    }

    #[test]
    fn zero_mailbox_capacity_rejected() {
        let mut s = RelaySettings::default();
        s.hub.mailbox_capacity = 0;
        let err = s.validate().unwrap_err();
        assert_eq!(err.field(), Some("hub.mailboxCapacity"));
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let mut s = RelaySettings::default();
        s.server.heartbeat_interval_ms = 0;
        assert!(matches!(
            s.validate(),
            Err(SettingsError::Invalid {
                field: "server.heartbeatIntervalMs",
                ..
            })
        ));
    }

    #[test]
    fn log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}

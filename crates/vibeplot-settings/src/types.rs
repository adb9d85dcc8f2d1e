//! Bridge settings.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Default bind host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 9753;

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
    /// Parse `"compact"` or `"json"` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Network and timing settings for one connection manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Host to bind the WebSocket listener on.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Where the viewer page is served; shown to the user while waiting.
    pub peer_url: String,
    /// How long `start` waits for the listener to bind.
    pub startup_timeout_ms: u64,
    /// How long a foreground `send` waits for the background write.
    pub send_timeout_ms: u64,
    /// Bound on a single frame write inside the session.
    pub write_timeout_ms: u64,
    /// How long `close` waits for the background thread to wind down.
    pub shutdown_timeout_ms: u64,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            peer_url: "http://localhost:8000".to_string(),
            startup_timeout_ms: 5_000,
            send_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            shutdown_timeout_ms: 2_000,
            max_message_size: 64 * 1024 * 1024, // 64 MB
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

impl BridgeSettings {
    /// Reject values the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("host must not be empty".into()));
        }
        for (name, value) in [
            ("startupTimeoutMs", self.startup_timeout_ms),
            ("sendTimeoutMs", self.send_timeout_ms),
            ("writeTimeoutMs", self.write_timeout_ms),
            ("shutdownTimeoutMs", self.shutdown_timeout_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be non-zero")));
            }
        }
        if self.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "maxMessageSize must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

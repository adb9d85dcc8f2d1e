//! Runtime configuration for a connection manager.

use std::time::Duration;

use vibeplot_settings::BridgeSettings;

/// Resolved settings with timeouts as [`Duration`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Viewer page URL, logged while waiting for a peer.
    pub peer_url: String,
    /// Bound on `start` waiting for the listener to bind.
    pub startup_timeout: Duration,
    /// Bound on a foreground `send`.
    pub send_timeout: Duration,
    /// Bound on a single frame write.
    pub write_timeout: Duration,
    /// Bound on `close` waiting for the background thread.
    pub shutdown_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ManagerConfig {
    /// `host:port` string handed to the socket layer.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&BridgeSettings> for ManagerConfig {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            peer_url: settings.peer_url.clone(),
            startup_timeout: Duration::from_millis(settings.startup_timeout_ms),
            send_timeout: Duration::from_millis(settings.send_timeout_ms),
            write_timeout: Duration::from_millis(settings.write_timeout_ms),
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
            max_message_size: settings.max_message_size,
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from(&BridgeSettings::default())
    }
}

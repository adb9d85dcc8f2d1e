//! Caller-facing convenience API.
//!
//! A [`Viewer`] holds at most one [`ConnectionManager`]; `connect` replaces
//! it, and the command helpers send through it.
//!
//! ```ignore
//! let mut viewer = Viewer::new();
//! viewer.connect("localhost", 9753, None, true, None)?;
//! viewer.load_model(&model_text)?;
//! ```

use std::time::Duration;

use tracing::info;
use vibeplot_core::{ConnectionError, Envelope};
use vibeplot_core::logging;
use vibeplot_settings::{BridgeSettings, LogFormat, load_settings};

use crate::config::ManagerConfig;
use crate::manager::{ConnectionManager, OpenCallback};

/// Owns the connection to the viewer for a caller.
#[derive(Default)]
pub struct Viewer {
    manager: Option<ConnectionManager>,
}

impl Viewer {
    /// No manager yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a bridge on `host:port`, replacing any previous one.
    ///
    /// Everything other than the address comes from [`load_settings`], so
    /// the settings file and `VIBEPLOT_*` variables still apply.
    ///
    /// `open_peer` is called with the bound address once listening (e.g. to
    /// open the viewer page). With `wait`, blocks until a viewer attaches or
    /// `timeout` elapses; on timeout the manager stays in place, so the
    /// caller may wait again through [`manager`](Self::manager).
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        open_peer: Option<OpenCallback>,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<&ConnectionManager, ConnectionError> {
        let mut settings =
            load_settings().map_err(|e| ConnectionError::Settings(e.to_string()))?;
        settings.host = host.to_owned();
        settings.port = port;
        self.connect_with(&settings, open_peer, wait, timeout)
    }

    /// [`connect`](Self::connect) from caller-supplied settings, which are
    /// validated before anything is torn down or started.
    pub fn connect_with(
        &mut self,
        settings: &BridgeSettings,
        open_peer: Option<OpenCallback>,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<&ConnectionManager, ConnectionError> {
        settings
            .validate()
            .map_err(|e| ConnectionError::Settings(e.to_string()))?;
        init_logging(settings);
        self.disconnect();

        let show_hint = open_peer.is_none();
        let manager = ConnectionManager::new(ManagerConfig::from(settings));
        let addr = manager.start(open_peer)?;
        let manager = self.manager.insert(manager);

        if wait {
            if show_hint {
                info!(url = %settings.peer_url, "waiting for viewer, open {} in a browser", settings.peer_url);
            }
            if !manager.wait_for_peer(timeout) {
                return Err(ConnectionError::Timeout { addr });
            }
        }
        Ok(manager)
    }

    /// The current manager, if connected.
    pub fn manager(&self) -> Option<&ConnectionManager> {
        self.manager.as_ref()
    }

    /// Close and drop the current manager.
    pub fn disconnect(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.close();
        }
    }

    /// Send model text for the viewer to render.
    pub fn load_model(&self, model_text: &str) -> Result<(), ConnectionError> {
        self.send(&Envelope::load_model(model_text))
    }

    /// Reset the viewer's zoom.
    pub fn reset_zoom(&self) -> Result<(), ConnectionError> {
        self.send(&Envelope::reset_zoom())
    }

    /// Reset the viewer's rotation.
    pub fn reset_rotation(&self) -> Result<(), ConnectionError> {
        self.send(&Envelope::reset_rotation())
    }

    fn send(&self, envelope: &Envelope) -> Result<(), ConnectionError> {
        let manager = self.manager.as_ref().ok_or(ConnectionError::NotConnected)?;
        manager.send(envelope).map_err(ConnectionError::from)
    }
}

/// Install the process-wide subscriber. No-op if one is already set.
fn init_logging(settings: &BridgeSettings) {
    match settings.log_format {
        LogFormat::Compact => logging::init_subscriber(&settings.log_level),
        LogFormat::Json => logging::init_json_subscriber(&settings.log_level),
    }
}

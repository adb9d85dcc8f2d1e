//! `ConnectionManager`: the blocking, foreground face of the bridge.
//!
//! Lifecycle phases move strictly forward:
//! `NotStarted → Starting → Running → Stopped`. A stopped manager cannot be
//! restarted; create a new one instead.
//!
//! Every blocking call is bounded by a configured timeout (except
//! [`wait_for_peer`](ConnectionManager::wait_for_peer) with `None`, which
//! still returns once the manager closes).

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use vibeplot_core::{Envelope, SendError, StartupError, TransportError};

use crate::config::ManagerConfig;
use crate::runtime::{self, Background, Command, Launch};
use crate::shutdown::ShutdownCoordinator;
use crate::state::{PeerInfo, PeerState};

/// Invoked once with the bound address after a successful start.
pub type OpenCallback = Box<dyn FnOnce(SocketAddr) + Send>;

/// Background context phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// `start` has not been called.
    NotStarted,
    /// `start` is waiting for the listener to bind.
    Starting,
    /// The listener is accepting peers.
    Running,
    /// Closed, or startup failed.
    Stopped,
}

#[derive(Clone)]
struct Endpoint {
    local_addr: SocketAddr,
    commands: UnboundedSender<Command>,
}

/// Owns the background thread and exposes start / wait / send / close.
pub struct ConnectionManager {
    config: Arc<ManagerConfig>,
    state: Arc<PeerState>,
    shutdown: Arc<ShutdownCoordinator>,
    phase: Mutex<Phase>,
    endpoint: Mutex<Option<Endpoint>>,
    /// Serializes `start` and `close`.
    lifecycle: Mutex<Option<Background>>,
    /// One foreground send in flight at a time.
    send_lock: Mutex<()>,
}

impl ConnectionManager {
    /// Create a manager. Nothing is bound until [`start`](Self::start).
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(PeerState::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            phase: Mutex::new(Phase::NotStarted),
            endpoint: Mutex::new(None),
            lifecycle: Mutex::new(None),
            send_lock: Mutex::new(()),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.lock().as_ref().map(|e| e.local_addr)
    }

    /// Start the background listener and block until it is bound.
    ///
    /// Calling `start` on a running manager returns the bound address
    /// without side effects. A stopped manager returns
    /// [`StartupError::Stopped`]. Any startup failure stops the manager.
    pub fn start(&self, on_ready: Option<OpenCallback>) -> Result<SocketAddr, StartupError> {
        let mut lifecycle = self.lifecycle.lock();
        match self.phase() {
            Phase::Running => {
                return self
                    .local_addr()
                    .ok_or_else(|| StartupError::Runtime("running without an address".into()));
            }
            Phase::Stopped => return Err(StartupError::Stopped),
            Phase::NotStarted | Phase::Starting => {}
        }
        self.set_phase(Phase::Starting);

        match self.launch() {
            Ok((background, endpoint)) => {
                let local_addr = endpoint.local_addr;
                *lifecycle = Some(background);
                *self.endpoint.lock() = Some(endpoint);
                self.set_phase(Phase::Running);
                drop(lifecycle);

                if let Some(on_ready) = on_ready {
                    on_ready(local_addr);
                }
                Ok(local_addr)
            }
            Err((background, error)) => {
                warn!(error_kind = error.error_kind(), %error, "bridge failed to start");
                self.shutdown.shutdown();
                self.state.mark_closed();
                self.set_phase(Phase::Stopped);
                if let Some(background) = background {
                    let _ = background.join(self.config.shutdown_timeout);
                }
                Err(error)
            }
        }
    }

    fn launch(&self) -> Result<(Background, Endpoint), (Option<Background>, StartupError)> {
        let launch = runtime::launch(
            Arc::clone(&self.config),
            Arc::clone(&self.state),
            Arc::clone(&self.shutdown),
        )
        .map_err(|e| (None, e))?;
        self.await_ready(launch)
    }

    /// Block until the background thread reports the bound address, bounded
    /// by the startup timeout.
    fn await_ready(
        &self,
        launch: Launch,
    ) -> Result<(Background, Endpoint), (Option<Background>, StartupError)> {
        let timeout = self.config.startup_timeout;
        let outcome = match launch.ready.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(StartupError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(StartupError::Runtime(
                "background thread exited before binding".into(),
            )),
        };

        match outcome {
            Ok(local_addr) => Ok((
                launch.background,
                Endpoint {
                    local_addr,
                    commands: launch.commands,
                },
            )),
            Err(error) => Err((Some(launch.background), error)),
        }
    }

    /// Block until a peer is attached, `timeout` elapses, or the manager closes.
    ///
    /// Returns whether a peer is attached. `None` waits without a bound.
    pub fn wait_for_peer(&self, timeout: Option<Duration>) -> bool {
        self.state.wait_attached(timeout)
    }

    /// Non-blocking attachment check.
    pub fn is_connected(&self) -> bool {
        self.state.is_attached()
    }

    /// Snapshot of the attached peer.
    pub fn peer(&self) -> Option<PeerInfo> {
        self.state.peer()
    }

    /// Send one envelope to the attached peer, blocking until it is written
    /// or the send timeout elapses.
    ///
    /// On timeout the write may still complete in the background.
    pub fn send(&self, envelope: &Envelope) -> Result<(), SendError> {
        let _serial = self.send_lock.lock();

        if self.phase() == Phase::NotStarted {
            return Err(SendError::NotStarted);
        }
        if !self.state.is_attached() {
            return Err(SendError::NoPeer);
        }
        let commands = self
            .endpoint
            .lock()
            .as_ref()
            .map(|e| e.commands.clone())
            .ok_or(SendError::NoPeer)?;

        let (reply, outcome) = mpsc::sync_channel(1);
        commands
            .send(Command::Send {
                envelope: envelope.clone(),
                reply,
            })
            .map_err(|_| SendError::NoPeer)?;

        let timeout = self.config.send_timeout;
        match outcome.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                debug!(kind = %envelope.kind(), ?timeout, "send timed out in foreground");
                Err(TransportError::Timeout(timeout).into())
            }
            // The command was dropped unexecuted: the runtime is shutting down.
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed.into()),
        }
    }

    /// Stop accepting, close the active session, and wait (bounded) for the
    /// background thread. Idempotent; wakes every `wait_for_peer` caller.
    pub fn close(&self) {
        let mut lifecycle = self.lifecycle.lock();
        {
            let mut phase = self.phase.lock();
            if *phase == Phase::Stopped {
                return;
            }
            *phase = Phase::Stopped;
        }

        self.shutdown.shutdown();
        self.state.mark_closed();
        let endpoint = self.endpoint.lock().take();

        if let Some(background) = lifecycle.take() {
            let stopped = background.join(self.config.shutdown_timeout);
            info!(
                local_addr = ?endpoint.map(|e| e.local_addr),
                stopped,
                "connection manager closed"
            );
        }
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

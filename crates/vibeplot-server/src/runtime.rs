//! Background execution context: one OS thread running a current-thread
//! tokio runtime that owns the listener, the session slot, and the command
//! loop.
//!
//! Foreground calls reach it through an unbounded command channel; each
//! command carries a `std` reply channel the caller blocks on with a
//! timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};
use vibeplot_core::{Envelope, SendError, StartupError};

use crate::config::ManagerConfig;
use crate::listener::{self, ListenerState};
use crate::shutdown::ShutdownCoordinator;
use crate::slot::SessionSlot;
use crate::state::PeerState;

const THREAD_NAME: &str = "vibeplot-bridge";

/// Work marshalled from the foreground onto the background runtime.
pub enum Command {
    /// Write one envelope to the attached session.
    Send {
        /// Envelope to write.
        envelope: Envelope,
        /// Receives the outcome.
        reply: SyncSender<Result<(), SendError>>,
    },
}

/// Handle to the running background thread.
pub struct Background {
    thread: JoinHandle<()>,
    exited: Receiver<()>,
}

impl Background {
    /// Wait up to `timeout` for the thread to exit.
    ///
    /// Returns `false` (and leaves the thread detached) on timeout.
    pub fn join(self, timeout: Duration) -> bool {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    warn!("background thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "background thread did not stop in time, detaching");
                false
            }
        }
    }
}

/// A just-spawned background context.
pub struct Launch {
    /// Thread handle.
    pub background: Background,
    /// Command channel into the runtime.
    pub commands: UnboundedSender<Command>,
    /// Receives the bound address, or why binding failed.
    pub ready: Receiver<Result<SocketAddr, StartupError>>,
}

/// Spawn the background thread. Binding happens on the thread; wait on
/// [`Launch::ready`] for the outcome.
pub fn launch(
    config: Arc<ManagerConfig>,
    state: Arc<PeerState>,
    shutdown: Arc<ShutdownCoordinator>,
) -> Result<Launch, StartupError> {
    let (commands_tx, commands_rx) = unbounded_channel();
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);
    let (exited_tx, exited_rx) = mpsc::sync_channel::<()>(1);

    let thread = thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || {
            // Dropped when the thread exits, which is what `join` waits on.
            let _exited = exited_tx;
            run(&config, state, &shutdown, commands_rx, &ready_tx);
        })
        .map_err(|e| StartupError::Runtime(e.to_string()))?;

    Ok(Launch {
        background: Background {
            thread,
            exited: exited_rx,
        },
        commands: commands_tx,
        ready: ready_rx,
    })
}

fn run(
    config: &ManagerConfig,
    state: Arc<PeerState>,
    shutdown: &Arc<ShutdownCoordinator>,
    commands: UnboundedReceiver<Command>,
    ready: &SyncSender<Result<SocketAddr, StartupError>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(StartupError::Runtime(e.to_string())));
            return;
        }
    };
    runtime.block_on(serve_until_shutdown(config, state, shutdown, commands, ready));
    debug!("background runtime exiting");
}

async fn serve_until_shutdown(
    config: &ManagerConfig,
    state: Arc<PeerState>,
    shutdown: &Arc<ShutdownCoordinator>,
    commands: UnboundedReceiver<Command>,
    ready: &SyncSender<Result<SocketAddr, StartupError>>,
) {
    let tcp = match listener::bind(config).await {
        Ok(tcp) => tcp,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let local_addr = match tcp.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            let _ = ready.send(Err(StartupError::Runtime(e.to_string())));
            return;
        }
    };

    let slot = Arc::new(SessionSlot::new(Arc::clone(&state)));
    let listener_state = ListenerState::new(Arc::clone(&slot), state, Arc::clone(shutdown), config);
    let server = tokio::spawn(listener::serve(tcp, listener_state, shutdown.token()));
    info!(%local_addr, "vibeplot server started at ws://{local_addr}");

    if ready.send(Ok(local_addr)).is_err() {
        // The foreground gave up waiting; nobody will ever send commands.
        shutdown.shutdown();
    }

    command_loop(&slot, commands, shutdown).await;
    debug!(
        shutdown = shutdown.is_shutting_down(),
        "command loop finished"
    );

    slot.close().await;
    shutdown.drain(vec![server], config.shutdown_timeout).await;
    info!(%local_addr, "vibeplot server stopped");
}

/// Execute commands one at a time until shutdown or until every sender is gone.
///
/// A send that has started runs to completion even if shutdown is signalled
/// meanwhile.
async fn command_loop(
    slot: &SessionSlot,
    mut commands: UnboundedReceiver<Command>,
    shutdown: &ShutdownCoordinator,
) {
    let token = shutdown.token();
    loop {
        let command = tokio::select! {
            biased;
            () = token.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Send { envelope, reply } => {
                let result = slot.send(&envelope).await;
                if let Err(error) = &result {
                    debug!(kind = %envelope.kind(), error_kind = error.error_kind(), "send command failed");
                }
                let _ = reply.send(result);
            }
        }
    }
}

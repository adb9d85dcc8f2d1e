//! Accepts viewer connections and drives each one until it detaches.
//!
//! The router serves `GET /health` and upgrades every other path to a
//! WebSocket, so the viewer may connect to `ws://host:port` or any path
//! below it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::{Json, Response};
use axum::routing::get;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};
use vibeplot_core::{Envelope, Inbound, StartupError};

use crate::config::ManagerConfig;
use crate::health::{self, HealthResponse};
use crate::session::{InboundStream, Session, SessionId};
use crate::shutdown::ShutdownCoordinator;
use crate::slot::SessionSlot;
use crate::state::PeerState;

/// Shared state accessible from the handlers.
#[derive(Clone)]
pub struct ListenerState {
    /// The single-session slot.
    pub slot: Arc<SessionSlot>,
    /// Foreground-visible peer state.
    pub peer_state: Arc<PeerState>,
    /// Parent of every session token.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the listener bound.
    pub start_time: Instant,
    /// Bound on a single frame write.
    pub write_timeout: Duration,
    /// Max inbound message size.
    pub max_message_size: usize,
}

impl ListenerState {
    /// State for a freshly bound listener.
    pub fn new(
        slot: Arc<SessionSlot>,
        peer_state: Arc<PeerState>,
        shutdown: Arc<ShutdownCoordinator>,
        config: &ManagerConfig,
    ) -> Self {
        Self {
            slot,
            peer_state,
            shutdown,
            start_time: Instant::now(),
            write_timeout: config.write_timeout,
            max_message_size: config.max_message_size,
        }
    }
}

/// Bind the configured address.
pub async fn bind(config: &ManagerConfig) -> Result<TcpListener, StartupError> {
    let addr = config.bind_addr();
    TcpListener::bind(addr.as_str())
        .await
        .map_err(|source| StartupError::Bind { addr, source })
}

/// Build the router.
pub fn router(state: ListenerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(ws_handler)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: ListenerState, shutdown: CancellationToken) {
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await;
    match result {
        Ok(()) => debug!("listener stopped"),
        Err(error) => warn!(%error, "listener stopped with error"),
    }
}

/// GET /health
async fn health_handler(State(state): State<ListenerState>) -> Json<HealthResponse> {
    let peer = state.peer_state.peer();
    Json(health::health_check(state.start_time, peer.as_ref()))
}

/// Any other path: WebSocket upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<ListenerState>,
) -> Response {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_peer(socket, remote_addr, state))
}

/// Attach the peer, consume its inbound messages, detach when it goes away.
#[instrument(skip_all, fields(session_id, remote_addr = %remote_addr))]
async fn run_peer(socket: WebSocket, remote_addr: SocketAddr, state: ListenerState) {
    let session_id = state.slot.next_id();
    let _ = Span::current().record("session_id", session_id);

    let mut session = Session::new(
        session_id,
        remote_addr,
        socket,
        state.write_timeout,
        state.shutdown.child_token(),
    );
    let Some(inbound) = session.receive() else {
        return;
    };

    if !state.slot.attach(session).await {
        return;
    }
    info!(session_id, %remote_addr, "viewer connected");

    let handled = drive_inbound(session_id, inbound).await;

    if state.slot.detach(session_id).await {
        info!(session_id, handled, "viewer disconnected");
    } else {
        debug!(session_id, handled, "session ended after being replaced");
    }
}

/// Consume an inbound sequence to its end. Returns how many messages arrived.
pub async fn drive_inbound(session_id: SessionId, mut inbound: InboundStream) -> usize {
    let mut count = 0;
    while let Some(message) = inbound.next().await {
        count += 1;
        handle_inbound(session_id, message);
    }
    count
}

/// Interpret one inbound message. Only acknowledgements matter.
pub fn handle_inbound(session_id: SessionId, message: Inbound) {
    match message {
        Inbound::Envelope(Envelope::Ack {
            success: true, ..
        }) => debug!(session_id, "viewer acknowledged command"),
        Inbound::Envelope(Envelope::Ack {
            success: false,
            error,
        }) => warn!(
            session_id,
            error = error.as_deref().unwrap_or("unknown error"),
            "viewer reported error"
        ),
        Inbound::Envelope(other) => {
            debug!(session_id, kind = %other.kind(), "ignoring command sent by viewer");
        }
        Inbound::Unrecognized { kind } => debug!(
            session_id,
            kind = kind.as_deref().unwrap_or("<missing>"),
            "ignoring unrecognized message"
        ),
    }
}

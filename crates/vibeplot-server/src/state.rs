//! Peer state shared between the background runtime and foreground callers.
//!
//! The background side publishes attach/detach transitions; foreground
//! callers read snapshots or block on the condition variable until a peer
//! is attached or the manager closes.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::session::SessionId;

/// Diagnostic snapshot of the attached peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    /// Monotonic id assigned on accept.
    pub session_id: SessionId,
    /// Remote socket address of the viewer.
    pub remote_addr: SocketAddr,
    /// When the session was attached.
    pub attached_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    peer: Option<PeerInfo>,
    closed: bool,
}

/// `no-peer` / `peer-attached` flag plus the closed marker.
#[derive(Debug, Default)]
pub struct PeerState {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl PeerState {
    /// Empty state: no peer, not closed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `peer-attached`. Ignored once closed.
    pub fn publish_attached(&self, info: PeerInfo) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.peer = Some(info);
        let _ = self.changed.notify_all();
    }

    /// Publish `no-peer` if `session_id` is still the attached one.
    ///
    /// Returns whether the state changed.
    pub fn publish_detached(&self, session_id: SessionId) -> bool {
        let mut inner = self.inner.lock();
        if inner.peer.as_ref().is_some_and(|p| p.session_id == session_id) {
            inner.peer = None;
            let _ = self.changed.notify_all();
            true
        } else {
            false
        }
    }

    /// Mark the manager closed: clear the peer and wake every waiter.
    pub fn mark_closed(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.peer = None;
        let _ = self.changed.notify_all();
    }

    /// Whether [`mark_closed`](Self::mark_closed) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Non-blocking `peer-attached` check.
    pub fn is_attached(&self) -> bool {
        self.inner.lock().peer.is_some()
    }

    /// Snapshot of the attached peer.
    pub fn peer(&self) -> Option<PeerInfo> {
        self.inner.lock().peer.clone()
    }

    /// Block until a peer is attached, `timeout` elapses, or the state is closed.
    ///
    /// `None` waits without a bound. Returns whether a peer is attached.
    pub fn wait_attached(&self, timeout: Option<Duration>) -> bool {
        let mut inner = self.inner.lock();
        let waiting = |inner: &mut Inner| inner.peer.is_none() && !inner.closed;

        match timeout {
            None => self.changed.wait_while(&mut inner, waiting),
            Some(timeout) => {
                // An unrepresentable deadline is treated as unbounded.
                match Instant::now().checked_add(timeout) {
                    Some(deadline) => {
                        let _ = self.changed.wait_while_until(&mut inner, waiting, deadline);
                    }
                    None => self.changed.wait_while(&mut inner, waiting),
                }
            }
        }
        inner.peer.is_some()
    }
}

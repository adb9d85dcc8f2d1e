//! The single attached-session slot, owned by the background runtime.
//!
//! Attach is last-writer-wins: a new peer closes and replaces the current
//! one. Detach is keyed by session id so a replaced session's late detach
//! cannot clear its successor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vibeplot_core::{Envelope, SendError};

use crate::session::{Session, SessionId};
use crate::state::PeerState;

/// Holds at most one [`Session`] and mirrors it into [`PeerState`].
pub struct SessionSlot {
    current: Mutex<Option<Session>>,
    next_id: AtomicU64,
    state: Arc<PeerState>,
}

impl SessionSlot {
    /// Empty slot publishing to `state`.
    pub fn new(state: Arc<PeerState>) -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            state,
        }
    }

    /// Allocate the next session id.
    pub fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) async fn current_id(&self) -> Option<SessionId> {
        self.current.lock().await.as_ref().map(Session::id)
    }

    /// Attach `session`, closing any session it replaces.
    ///
    /// Once the peer state is closed the session is closed instead, and
    /// `false` is returned.
    pub async fn attach(&self, mut session: Session) -> bool {
        if self.state.is_closed() {
            debug!(session_id = session.id(), "manager closed, refusing viewer");
            session.close().await;
            return false;
        }
        let mut current = self.current.lock().await;
        if let Some(mut previous) = current.take() {
            info!(
                previous = previous.id(),
                session_id = session.id(),
                "viewer replaced by new connection"
            );
            previous.close().await;
            let _ = self.state.publish_detached(previous.id());
        }

        self.state.publish_attached(session.info());
        *current = Some(session);
        true
    }

    /// Detach and close `session_id` if it is still attached.
    ///
    /// Returns whether anything was detached.
    pub async fn detach(&self, session_id: SessionId) -> bool {
        let mut current = self.current.lock().await;
        if current.as_ref().map(Session::id) != Some(session_id) {
            debug!(session_id, "stale detach ignored");
            return false;
        }
        if let Some(mut session) = current.take() {
            session.close().await;
        }
        let _ = self.state.publish_detached(session_id);
        true
    }

    /// Send `envelope` to the attached session.
    ///
    /// A `Closed` or `Io` failure detaches the session; a timeout leaves it
    /// attached.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), SendError> {
        let mut current = self.current.lock().await;
        let session = current.as_mut().ok_or(SendError::NoPeer)?;

        match session.send(envelope).await {
            Ok(()) => Ok(()),
            Err(error) if error.is_fatal() => {
                let session_id = session.id();
                warn!(session_id, error_kind = error.error_kind(), %error, "send failed, dropping viewer");
                if let Some(mut session) = current.take() {
                    session.close().await;
                }
                let _ = self.state.publish_detached(session_id);
                Err(error.into())
            }
            Err(error) => {
                warn!(session_id = session.id(), error_kind = error.error_kind(), %error, "send failed");
                Err(error.into())
            }
        }
    }

    /// Close and clear whatever is attached.
    pub async fn close(&self) {
        let mut current = self.current.lock().await;
        if let Some(mut session) = current.take() {
            let session_id = session.id();
            session.close().await;
            let _ = self.state.publish_detached(session_id);
            info!(session_id, "viewer disconnected on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::extract::ws::Message;
    use futures::StreamExt;
    use vibeplot_core::TransportError;

    use super::*;
    use crate::session::test_support::channel_session;

    fn slot() -> (SessionSlot, Arc<PeerState>) {
        let state = Arc::new(PeerState::new());
        (SessionSlot::new(Arc::clone(&state)), state)
    }

    #[test]
    fn ids_are_monotonic() {
        let (slot, _state) = slot();
        let a = slot.next_id();
        let b = slot.next_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn attach_publishes_peer() {
        let (slot, state) = slot();
        let (session, _written, _frames) = channel_session(1);

        assert!(slot.attach(session).await);
        assert_eq!(slot.current_id().await, Some(1));
        assert_eq!(state.peer().unwrap().session_id, 1);
    }

    #[tokio::test]
    async fn attach_replaces_and_closes_previous() {
        let (slot, state) = slot();
        let (first, mut first_written, _f1) = channel_session(1);
        let (second, _second_written, _f2) = channel_session(2);

        let _ = slot.attach(first).await;
        let _ = slot.attach(second).await;

        assert_matches!(first_written.next().await, Some(Message::Close(None)));
        assert_eq!(slot.current_id().await, Some(2));
        assert_eq!(state.peer().unwrap().session_id, 2);
    }

    #[tokio::test]
    async fn stale_detach_is_ignored() {
        let (slot, state) = slot();
        let (first, _w1, _f1) = channel_session(1);
        let (second, _w2, _f2) = channel_session(2);
        let _ = slot.attach(first).await;
        let _ = slot.attach(second).await;

        assert!(!slot.detach(1).await);
        assert!(state.is_attached());

        assert!(slot.detach(2).await);
        assert!(!state.is_attached());
        assert!(slot.current_id().await.is_none());
    }

    #[tokio::test]
    async fn send_without_peer() {
        let (slot, _state) = slot();
        let err = slot.send(&Envelope::reset_zoom()).await.unwrap_err();
        assert_eq!(err, SendError::NoPeer);
    }

    #[tokio::test]
    async fn send_reaches_attached_session() {
        let (slot, _state) = slot();
        let (session, mut written, _frames) = channel_session(1);
        let _ = slot.attach(session).await;

        slot.send(&Envelope::reset_rotation()).await.unwrap();
        assert_matches!(written.next().await, Some(Message::Text(t)) if t.as_str() == r#"{"type":"reset_rotation"}"#);
    }

    #[tokio::test]
    async fn fatal_send_detaches() {
        let (slot, state) = slot();
        let (session, written, _frames) = channel_session(1);
        let _ = slot.attach(session).await;
        drop(written);

        let err = slot.send(&Envelope::reset_zoom()).await.unwrap_err();
        assert_eq!(err, SendError::Transport(TransportError::Closed));
        assert!(!state.is_attached());
        assert!(slot.current_id().await.is_none());
        assert_eq!(
            slot.send(&Envelope::reset_zoom()).await.unwrap_err(),
            SendError::NoPeer
        );
    }

    #[tokio::test]
    async fn attach_after_close_is_refused() {
        let (slot, state) = slot();
        state.mark_closed();
        let (session, mut written, _frames) = channel_session(1);

        assert!(!slot.attach(session).await);
        assert!(!state.is_attached());
        assert!(slot.current_id().await.is_none());
        assert_matches!(written.next().await, Some(Message::Close(None)));
    }

    #[tokio::test]
    async fn close_clears_slot() {
        let (slot, state) = slot();
        let (session, mut written, _frames) = channel_session(1);
        let _ = slot.attach(session).await;

        slot.close().await;
        assert!(!state.is_attached());
        assert_matches!(written.next().await, Some(Message::Close(None)));
        slot.close().await;
    }
}

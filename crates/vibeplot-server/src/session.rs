//! A live connection to the one attached viewer.
//!
//! The session owns the transport: a write half used by [`Session::send`]
//! and a read half handed out once through [`Session::receive`]. Both halves
//! stop when the session token is cancelled.

use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vibeplot_core::{Envelope, Inbound, TransportError};

use crate::state::PeerInfo;

/// Monotonic per-manager session identifier.
pub type SessionId = u64;

/// Write half of the transport.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Read half of the transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, axum::Error>> + Send>>;

/// Decoded inbound messages, ending when the transport closes.
pub type InboundStream = Pin<Box<dyn Stream<Item = Inbound> + Send>>;

/// Handle to the attached viewer's transport.
pub struct Session {
    id: SessionId,
    remote_addr: SocketAddr,
    attached_at: DateTime<Utc>,
    sink: Option<FrameSink>,
    frames: Option<FrameStream>,
    cancel: CancellationToken,
    write_timeout: Duration,
}

impl Session {
    /// Wrap an upgraded WebSocket.
    pub fn new(
        id: SessionId,
        remote_addr: SocketAddr,
        socket: WebSocket,
        write_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (sink, frames) = socket.split();
        Self::from_parts(
            id,
            remote_addr,
            Box::pin(sink),
            Box::pin(frames),
            write_timeout,
            cancel,
        )
    }

    /// Build a session from an arbitrary frame sink and stream.
    pub fn from_parts(
        id: SessionId,
        remote_addr: SocketAddr,
        sink: FrameSink,
        frames: FrameStream,
        write_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            remote_addr,
            attached_at: Utc::now(),
            sink: Some(sink),
            frames: Some(frames),
            cancel,
            write_timeout,
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Viewer's socket address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// When the session was created.
    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }

    /// Diagnostic snapshot.
    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            session_id: self.id,
            remote_addr: self.remote_addr,
            attached_at: self.attached_at,
        }
    }

    #[cfg(test)]
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether [`close`](Self::close) ran or the token was cancelled.
    pub fn is_closed(&self) -> bool {
        self.sink.is_none() || self.cancel.is_cancelled()
    }

    /// Write one envelope as a single text frame.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let sink = self.sink.as_mut().ok_or(TransportError::Closed)?;
        let frame = Message::Text(envelope.encode().into());

        match tokio::time::timeout(self.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {
                debug!(session_id = self.id, kind = %envelope.kind(), "envelope sent");
                Ok(())
            }
            Ok(Err(error)) => Err(classify_write_error(error)),
            Err(_) => Err(TransportError::Timeout(self.write_timeout)),
        }
    }

    /// Take the inbound sequence. Returns `None` after the first call.
    ///
    /// The sequence decodes text frames (and UTF-8 binary frames), logs and
    /// skips malformed ones, and ends on a close frame, a read error, or
    /// cancellation.
    pub fn receive(&mut self) -> Option<InboundStream> {
        let frames = self.frames.take()?;
        let session_id = self.id;

        let inbound = futures::stream::unfold(frames, move |mut frames| async move {
            loop {
                let message = match frames.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(error)) => {
                        debug!(session_id, %error, "read failed");
                        return None;
                    }
                    None => return None,
                };
                let text = match frame_text(message) {
                    Frame::Text(text) => text,
                    Frame::Skip => continue,
                    Frame::Close => return None,
                };
                match Envelope::decode(&text) {
                    Ok(inbound) => return Some((inbound, frames)),
                    Err(error) => {
                        warn!(session_id, error_kind = "decode", %error, "dropping malformed frame");
                    }
                }
            }
        })
        .take_until(self.cancel.clone().cancelled_owned());

        Some(Box::pin(inbound))
    }

    /// Send a close frame (best effort) and release the transport. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let closing = sink.send(Message::Close(None));
            match tokio::time::timeout(self.write_timeout, closing).await {
                Ok(Ok(())) => debug!(session_id = self.id, "close frame sent"),
                Ok(Err(error)) => debug!(session_id = self.id, %error, "close frame failed"),
                Err(_) => debug!(session_id = self.id, "close frame timed out"),
            }
        }
        self.cancel.cancel();
    }
}

/// `Closed` when the peer is gone, `Io` for any other write failure.
fn classify_write_error(error: axum::Error) -> TransportError {
    let error = error.into_inner();
    if matches!(
        error.downcast_ref::<tungstenite::Error>(),
        Some(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)
    ) {
        return TransportError::Closed;
    }

    let mut source: Option<&(dyn StdError + 'static)> = Some(&*error);
    while let Some(current) = source {
        if current
            .downcast_ref::<io::Error>()
            .is_some_and(|io| peer_gone(io.kind()))
        {
            return TransportError::Closed;
        }
        source = current.source();
    }
    TransportError::Io(error.to_string())
}

fn peer_gone(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

enum Frame {
    Text(String),
    Skip,
    Close,
}

fn frame_text(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Frame::Text(text),
            Err(_) => {
                debug!(len = data.len(), "skipping non-UTF8 binary frame");
                Frame::Skip
            }
        },
        // Answered by the transport layer.
        Message::Ping(_) | Message::Pong(_) => Frame::Skip,
        Message::Close(_) => Frame::Close,
    }
}

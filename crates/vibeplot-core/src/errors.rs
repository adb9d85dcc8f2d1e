//! Error taxonomy for the bridge.
//!
//! - [`DecodeError`]: malformed inbound frame; dropped and logged by the receiver
//! - [`TransportError`]: a single write against the session failed
//! - [`StartupError`]: the background listener never confirmed it was bound
//! - [`SendError`]: caller-facing send failure, always recoverable
//! - [`ConnectionError`]: convenience-layer failure

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::envelope::EnvelopeKind;

/// An inbound frame could not be decoded as an envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("envelope must be a JSON object")]
    NotAnObject,

    /// Known kind with missing or mistyped fields.
    #[error("invalid {kind} envelope: {source}")]
    InvalidFields {
        /// The kind named by the `type` tag.
        kind: EnvelopeKind,
        /// Field-level failure.
        #[source]
        source: serde_json::Error,
    },
}

/// A write against the session transport failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The session or its socket is no longer open.
    #[error("transport closed")]
    Closed,

    /// The write did not complete in time.
    #[error("transport write timed out after {0:?}")]
    Timeout(Duration),

    /// Lower-level socket failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether the session should be dropped after this failure.
    ///
    /// A timed-out write leaves the session attached; the peer may still be
    /// reading slowly.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed | Self::Io(_))
    }

    /// Short classification string for logging.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
        }
    }
}

/// The background context failed to come up.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The listener did not confirm it was bound within the bound.
    #[error("listener did not start within {0:?}")]
    Timeout(Duration),

    /// Binding the listen address failed (in use, permission denied, unresolvable).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The `host:port` that was requested.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The background runtime could not be built or exited early.
    #[error("background runtime failed: {0}")]
    Runtime(String),

    /// The manager was already closed; it cannot be restarted.
    #[error("connection manager already stopped")]
    Stopped,
}

impl StartupError {
    /// Short classification string for logging.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Bind { .. } => "bind",
            Self::Runtime(_) => "runtime",
            Self::Stopped => "stopped",
        }
    }
}

/// Caller-facing send failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SendError {
    /// No peer is attached; nothing was written.
    #[error("no peer attached")]
    NoPeer,

    /// `start` was never called.
    #[error("connection manager not started")]
    NotStarted,

    /// The write itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SendError {
    /// Short classification string for logging.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NoPeer => "no_peer",
            Self::NotStarted => "not_started",
            Self::Transport(e) => e.error_kind(),
        }
    }
}

/// Failure of the convenience layer.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No peer attached before the wait bound elapsed.
    #[error("timed out waiting for viewer on {addr}")]
    Timeout {
        /// Address the listener is bound to.
        addr: SocketAddr,
    },

    /// No manager, or no peer attached.
    #[error("not connected; call connect() and open the viewer first")]
    NotConnected,

    /// Settings could not be loaded or were rejected.
    #[error("{0}")]
    Settings(String),

    /// The manager failed to start.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// A send failed for a reason other than a missing peer.
    #[error(transparent)]
    Send(SendError),
}

impl From<SendError> for ConnectionError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NoPeer | SendError::NotStarted => Self::NotConnected,
            other @ SendError::Transport(_) => Self::Send(other),
        }
    }
}

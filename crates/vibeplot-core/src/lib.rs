//! # vibeplot-core
//!
//! Shared vocabulary for the vibeplot bridge.
//!
//! - **Envelope**: the tagged wire message exchanged with the viewer
//!   (`load_model`, `reset_zoom`, `reset_rotation`, `ack`)
//! - **Errors**: decode, transport, startup, send, and connection errors via `thiserror`
//! - **Logging**: `tracing` subscriber setup and in-memory log capture for tests

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod logging;

pub use envelope::{Envelope, EnvelopeKind, Inbound};
pub use errors::{ConnectionError, DecodeError, SendError, StartupError, TransportError};

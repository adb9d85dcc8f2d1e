//! # vibeplot-server
//!
//! Bridges blocking callers to a single WebSocket peer (the vibeplot viewer).
//!
//! - **Listener**: axum router with `/health` and a WebSocket upgrade on every other path
//! - **Session**: the one attached peer's transport, with bounded writes
//! - **Runtime**: a dedicated thread running a current-thread tokio runtime
//! - **Manager**: blocking `start` / `wait_for_peer` / `send` / `close`
//! - **Viewer**: convenience API holding one manager

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod health;
pub mod listener;
pub mod manager;
pub mod runtime;
pub mod session;
pub mod shutdown;
pub mod slot;
pub mod state;

pub use api::Viewer;
pub use config::ManagerConfig;
pub use manager::{ConnectionManager, OpenCallback, Phase};
pub use session::SessionId;
pub use state::PeerInfo;

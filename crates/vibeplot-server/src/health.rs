//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::state::PeerInfo;

/// Health check response body.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the listener is serving.
    pub status: &'static str,
    /// Whether a viewer is attached.
    pub connected: bool,
    /// Id of the attached session, if any.
    pub session_id: Option<u64>,
    /// Seconds since the listener bound.
    pub uptime_secs: u64,
}

/// Build a health response from the current peer snapshot.
pub fn health_check(start_time: Instant, peer: Option<&PeerInfo>) -> HealthResponse {
    HealthResponse {
        status: "ok",
        connected: peer.is_some(),
        session_id: peer.map(|p| p.session_id),
        uptime_secs: start_time.elapsed().as_secs(),
    }
}

use crate::use_cases::RelaySession;
use std::sync::Arc;
use std::time::Duration;

/// Keepalive policy applied to every websocket the relay owns.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    // How often a ping is sent.
    pub interval: Duration,
    // Connections silent for longer than this are dropped.
    pub idle_timeout: Duration,
}

#[derive(Clone)]
pub struct AppState {
    // The one relay session this process owns.
    pub session: Arc<RelaySession>,
    pub heartbeat: HeartbeatSettings,
    // Per-connection outbound frame buffer.
    pub downstream_frame_capacity: usize,
}

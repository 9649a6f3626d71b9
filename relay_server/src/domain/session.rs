// Observable state of the relay session.

/// Lifecycle of the single upstream telemetry connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl UpstreamStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, UpstreamStatus::Connected)
    }
}

/// Point-in-time snapshot of the relay, surfaced to operators over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub upstream: UpstreamStatus,
    pub downstream_attached: bool,
    pub loon_state_subscribed: bool,
}

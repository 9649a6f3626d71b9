// Network adapter modules split by the downstream client socket vs the upstream telemetry socket.

pub mod downstream;
pub mod upstream;

pub use downstream::ws_handler;
pub use upstream::{UpstreamSettings, upstream_task};

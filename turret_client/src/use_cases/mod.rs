pub mod autofire;
pub mod client_state;
pub mod router;
pub mod turrets;

#[cfg(test)]
pub(crate) mod test_support;

pub use autofire::{AutoFireLoop, AutoFireStats, PopCommand};
pub use client_state::ClientState;
pub use router::{ClientMessageRouter, RoundEndMatcher, RouteOutcome};
pub use turrets::{TickerFactory, TurretBoard, TurretError, TurretSnapshot};

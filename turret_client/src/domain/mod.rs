// Domain layer: coordinate frames, balloon state, targeting and game rules.

pub mod backoff;
pub mod balloons;
pub mod game;
pub mod geometry;
pub mod messages;
pub mod ports;
pub mod targeting;
pub mod turret;

pub use backoff::Backoff;
pub use balloons::{BalloonPosition, BalloonPositionSet};
pub use game::{GameStatus, GameStatusError};
pub use geometry::{CanvasGeometry, TelemetryPoint, TurretPlacement, distance};
pub use messages::{MessageHistory, MessageRecord};
pub use ports::{Clock, FrameSink, Ticker};
pub use targeting::closest_balloon;
pub use turret::{Turret, TurretId};

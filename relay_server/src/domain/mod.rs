// Domain layer: relay session state and reconnect policy.

pub mod backoff;
pub mod session;

pub use backoff::Backoff;
pub use session::{SessionStatus, UpstreamStatus};

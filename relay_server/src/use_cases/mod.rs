// Use cases layer: relay workflows between the client socket and the upstream feed.

pub mod relay;

pub use relay::{CommandError, DownstreamHandle, ForwardOutcome, RelaySession};

// Ports the use cases depend on; adapters live in `interface_adapters`.

use crate::domain::balloons::BalloonPositionSet;
use async_trait::async_trait;

pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> u64;
}

/// Paces a turret's fire loop.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. `false` means the source is exhausted and the loop should stop.
    async fn tick(&mut self) -> bool;
}

#[async_trait]
impl<T: Ticker + ?Sized> Ticker for Box<T> {
    async fn tick(&mut self) -> bool {
        (**self).tick().await
    }
}

/// Where routed frames end up.
pub trait FrameSink: Send + Sync {
    /// Replace the balloon set wholesale.
    fn replace_balloons(&self, balloons: BalloonPositionSet);
    fn push_message(&self, timestamp_ms: u64, text: String);
    fn round_ended(&self, text: &str);
}

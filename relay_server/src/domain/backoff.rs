use std::time::Duration;

/// Bounded exponential backoff for reconnect loops.
///
/// The first delay is `min`; every following delay doubles until it saturates at `max`.
/// `reset` is called after a connection succeeds so the next outage starts small again.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            // A max below min would never grow; clamp so callers can't invert the range.
            max: max.max(min),
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.min,
            Some(prev) => prev.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

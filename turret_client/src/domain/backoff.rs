use std::time::Duration;

/// Reconnect delay that doubles from `min` up to `max`.
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
            max: max.max(min),
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let next = self
            .current
            .map_or(self.min, |prev| prev.saturating_mul(2).min(self.max));
        self.current = Some(next);
        next
    }

    // Called once the relay accepted us again.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

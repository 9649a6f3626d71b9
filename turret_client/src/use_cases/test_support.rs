// Fakes shared by the use case tests.

use crate::domain::{BalloonPositionSet, Clock, FrameSink, Ticker};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

pub struct FixedClock {
    millis: u64,
}

impl FixedClock {
    pub fn at(millis: u64) -> Self {
        Self { millis }
    }
}

impl Clock for FixedClock {
    fn now_epoch_millis(&self) -> u64 {
        self.millis
    }
}

#[derive(Default)]
pub struct RecordingSink {
    balloons: Mutex<Option<BalloonPositionSet>>,
    // Most recent first, like the real history.
    history: Mutex<Vec<(u64, String)>>,
    rounds_ended: Mutex<usize>,
}

impl RecordingSink {
    pub fn last_balloons(&self) -> Option<BalloonPositionSet> {
        self.balloons.lock().unwrap().clone()
    }

    pub fn history_texts(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn history_timestamps(&self) -> Vec<u64> {
        self.history.lock().unwrap().iter().map(|(ts, _)| *ts).collect()
    }

    pub fn rounds_ended(&self) -> usize {
        *self.rounds_ended.lock().unwrap()
    }
}

impl FrameSink for RecordingSink {
    fn replace_balloons(&self, balloons: BalloonPositionSet) {
        *self.balloons.lock().unwrap() = Some(balloons);
    }

    fn push_message(&self, timestamp_ms: u64, text: String) {
        self.history.lock().unwrap().insert(0, (timestamp_ms, text));
    }

    fn round_ended(&self, _text: &str) {
        *self.rounds_ended.lock().unwrap() += 1;
    }
}

/// Ticker driven by a [`TickDriver`].
///
/// Each `tick` first reports that the loop is waiting, so the driver knows the
/// previous tick has been fully handled.
pub struct ManualTicker {
    ready_tx: mpsc::UnboundedSender<()>,
    tick_rx: mpsc::UnboundedReceiver<()>,
}

pub struct TickDriver {
    ready_rx: mpsc::UnboundedReceiver<()>,
    tick_tx: mpsc::UnboundedSender<()>,
    parked: bool,
}

pub fn manual_ticker() -> (ManualTicker, TickDriver) {
    let (ready_tx, ready_rx) = mpsc::unbounded_channel();
    let (tick_tx, tick_rx) = mpsc::unbounded_channel();
    (
        ManualTicker { ready_tx, tick_rx },
        TickDriver {
            ready_rx,
            tick_tx,
            parked: false,
        },
    )
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        let _ = self.ready_tx.send(());
        self.tick_rx.recv().await.is_some()
    }
}

impl TickDriver {
    /// Release one tick and wait until the loop has fully handled it.
    pub async fn step(&mut self) {
        self.settle().await;
        let _ = self.tick_tx.send(());
        self.parked = false;
        self.settle().await;
    }

    /// Wait until the loop is parked on its next tick.
    pub async fn settle(&mut self) {
        if self.parked {
            return;
        }
        self.ready_rx
            .recv()
            .await
            .expect("fire loop stopped waiting for ticks");
        self.parked = true;
    }
}

// Shared client state: latest balloons, game status and message history.

use crate::domain::{
    BalloonPositionSet, FrameSink, GameStatus, GameStatusError, MessageHistory, MessageRecord,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct ClientState {
    balloons_tx: watch::Sender<Arc<BalloonPositionSet>>,
    status_tx: watch::Sender<GameStatus>,
    history: Mutex<MessageHistory>,
    // Move to Ended when the feed reports an empty round.
    end_game_on_round_end: bool,
    rounds_ended: AtomicU64,
}

impl ClientState {
    pub fn new(history_limit: usize, end_game_on_round_end: bool) -> Self {
        let (balloons_tx, _) = watch::channel(Arc::new(BalloonPositionSet::new()));
        let (status_tx, _) = watch::channel(GameStatus::NotStarted);
        Self {
            balloons_tx,
            status_tx,
            history: Mutex::new(MessageHistory::with_capacity(history_limit)),
            end_game_on_round_end,
            rounds_ended: AtomicU64::new(0),
        }
    }

    pub fn subscribe_balloons(&self) -> watch::Receiver<Arc<BalloonPositionSet>> {
        self.balloons_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<GameStatus> {
        self.status_tx.subscribe()
    }

    pub fn balloons(&self) -> Arc<BalloonPositionSet> {
        self.balloons_tx.borrow().clone()
    }

    pub fn status(&self) -> GameStatus {
        *self.status_tx.borrow()
    }

    pub fn start_game(&self) -> Result<GameStatus, GameStatusError> {
        self.transition(GameStatus::start)
    }

    pub fn end_game(&self) -> Result<GameStatus, GameStatusError> {
        self.transition(GameStatus::end)
    }

    fn transition(
        &self,
        step: fn(GameStatus) -> Result<GameStatus, GameStatusError>,
    ) -> Result<GameStatus, GameStatusError> {
        let mut result = Ok(GameStatus::NotStarted);
        self.status_tx.send_if_modified(|status| match step(*status) {
            Ok(next) => {
                *status = next;
                result = Ok(next);
                true
            }
            Err(err) => {
                result = Err(err);
                false
            }
        });
        result
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.lock_history().iter().cloned().collect()
    }

    pub fn rounds_ended(&self) -> u64 {
        self.rounds_ended.load(Ordering::Relaxed)
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, MessageHistory> {
        // A panic mid-push leaves the history usable.
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSink for ClientState {
    fn replace_balloons(&self, balloons: BalloonPositionSet) {
        debug!(count = balloons.len(), "balloon state updated");
        self.balloons_tx.send_replace(Arc::new(balloons));
    }

    fn push_message(&self, timestamp_ms: u64, text: String) {
        self.lock_history().push(MessageRecord { timestamp_ms, text });
    }

    fn round_ended(&self, text: &str) {
        self.rounds_ended.fetch_add(1, Ordering::Relaxed);
        if !self.end_game_on_round_end {
            return;
        }
        match self.end_game() {
            Ok(_) => info!(%text, "game ended"),
            Err(err) => warn!(error = %err, "round ended outside a running game"),
        }
    }
}

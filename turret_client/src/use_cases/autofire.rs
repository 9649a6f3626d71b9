// Per-turret fire loop: on every tick of an active game, pop the nearest balloon.

use crate::domain::{
    BalloonPositionSet, CanvasGeometry, GameStatus, Ticker, TurretId, TurretPlacement,
    closest_balloon,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, warn};

const LOG_THROTTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopCommand {
    pub turret_id: TurretId,
    pub loon_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArmState {
    Idle,
    Armed,
}

impl ArmState {
    fn for_status(status: GameStatus) -> Self {
        if status.is_active() {
            ArmState::Armed
        } else {
            ArmState::Idle
        }
    }
}

/// Balloon a turret at `placement` should pop right now, if any.
pub fn fire_decision(
    status: GameStatus,
    placement: TurretPlacement,
    balloons: &BalloonPositionSet,
    geometry: &CanvasGeometry,
) -> Option<String> {
    if ArmState::for_status(status) != ArmState::Armed {
        return None;
    }
    let point = geometry.to_telemetry_frame(placement);
    closest_balloon(balloons, point).map(str::to_owned)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoFireStats {
    pub ticks: u64,
    pub fired: u64,
    pub dropped: u64,
}

pub struct AutoFireLoop<T> {
    pub turret_id: TurretId,
    pub geometry: CanvasGeometry,
    pub ticker: T,
    pub status_rx: watch::Receiver<GameStatus>,
    pub balloons_rx: watch::Receiver<Arc<BalloonPositionSet>>,
    // The turret may be dragged between ticks; read fresh each time.
    pub placement_rx: watch::Receiver<TurretPlacement>,
    pub commands_tx: mpsc::Sender<PopCommand>,
    pub shutdown: Arc<Notify>,
}

impl<T: Ticker> AutoFireLoop<T> {
    pub async fn run(mut self) -> AutoFireStats {
        let mut stats = AutoFireStats::default();
        let mut arm = ArmState::Idle;
        let mut last_drop_log = Instant::now() - LOG_THROTTLE;
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    debug!(turret_id = %self.turret_id, "fire loop cancelled");
                    break;
                }

                more = self.ticker.tick() => {
                    if !more {
                        break;
                    }
                    stats.ticks += 1;

                    let status = *self.status_rx.borrow();
                    let next_arm = ArmState::for_status(status);
                    if next_arm != arm {
                        debug!(turret_id = %self.turret_id, ?status, armed = next_arm == ArmState::Armed, "fire loop state changed");
                        arm = next_arm;
                    }

                    let placement = *self.placement_rx.borrow();
                    let balloons = self.balloons_rx.borrow().clone();
                    let Some(loon_id) = fire_decision(status, placement, &balloons, &self.geometry) else {
                        continue;
                    };

                    let command = PopCommand {
                        turret_id: self.turret_id.clone(),
                        loon_id,
                    };
                    match self.commands_tx.try_send(command) {
                        Ok(()) => stats.fired += 1,
                        Err(err) => {
                            stats.dropped += 1;
                            if last_drop_log.elapsed() >= LOG_THROTTLE {
                                last_drop_log = Instant::now();
                                warn!(turret_id = %self.turret_id, error = %err, dropped = stats.dropped, "pop command dropped");
                            }
                        }
                    }
                }
            }
        }

        stats
    }
}

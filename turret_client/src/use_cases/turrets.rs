// Turrets on the board, each paired with its own fire loop task.

use crate::domain::geometry::TURRET_SIZE_PX;
use crate::domain::{
    BalloonPositionSet, CanvasGeometry, GameStatus, Ticker, Turret, TurretId, TurretPlacement,
};
use crate::use_cases::autofire::{AutoFireLoop, AutoFireStats, PopCommand};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};

/// Builds the tick source for each new turret.
pub type TickerFactory = Arc<dyn Fn() -> Box<dyn Ticker> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurretError {
    NotFound(TurretId),
    // Turrets cannot be moved while a game is running.
    PlacementLocked,
}

impl fmt::Display for TurretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurretError::NotFound(id) => write!(f, "no turret with id {id}"),
            TurretError::PlacementLocked => f.write_str("turrets cannot move while the game is in progress"),
        }
    }
}

impl std::error::Error for TurretError {}

#[derive(Debug, Clone, PartialEq)]
pub struct TurretSnapshot {
    pub turret: Turret,
    pub placement: TurretPlacement,
}

struct TurretEntry {
    turret: Turret,
    placement_tx: watch::Sender<TurretPlacement>,
    shutdown: Arc<Notify>,
    task: JoinHandle<AutoFireStats>,
}

pub struct TurretBoard {
    geometry: CanvasGeometry,
    status_rx: watch::Receiver<GameStatus>,
    balloons_rx: watch::Receiver<Arc<BalloonPositionSet>>,
    commands_tx: mpsc::Sender<PopCommand>,
    ticker_factory: TickerFactory,
    // Creation order.
    turrets: Vec<TurretEntry>,
}

impl TurretBoard {
    pub fn new(
        geometry: CanvasGeometry,
        status_rx: watch::Receiver<GameStatus>,
        balloons_rx: watch::Receiver<Arc<BalloonPositionSet>>,
        commands_tx: mpsc::Sender<PopCommand>,
        ticker_factory: TickerFactory,
    ) -> Self {
        Self {
            geometry,
            status_rx,
            balloons_rx,
            commands_tx,
            ticker_factory,
            turrets: Vec::new(),
        }
    }

    /// Place a new turret and start its fire loop. Must run inside a tokio runtime.
    pub fn add_turret(&mut self, placement: TurretPlacement, level: u32) -> TurretId {
        let turret = Turret::new(level);
        let placement = self.geometry.clamp_placement(placement, TURRET_SIZE_PX);
        let (placement_tx, placement_rx) = watch::channel(placement);
        let shutdown = Arc::new(Notify::new());

        let fire_loop = AutoFireLoop {
            turret_id: turret.id.clone(),
            geometry: self.geometry,
            ticker: (self.ticker_factory)(),
            status_rx: self.status_rx.clone(),
            balloons_rx: self.balloons_rx.clone(),
            placement_rx,
            commands_tx: self.commands_tx.clone(),
            shutdown: shutdown.clone(),
        };
        let span = info_span!("turret", turret_id = %turret.id);
        let task = tokio::spawn(fire_loop.run().instrument(span));

        info!(turret_id = %turret.id, level, left = placement.left, top = placement.top, "turret placed");
        let id = turret.id.clone();
        self.turrets.push(TurretEntry {
            turret,
            placement_tx,
            shutdown,
            task,
        });
        id
    }

    pub fn level_up(&mut self, id: &TurretId) -> Result<u32, TurretError> {
        let entry = self.entry_mut(id)?;
        entry.turret.level_up();
        info!(turret_id = %id, level = entry.turret.level, "turret leveled up");
        Ok(entry.turret.level)
    }

    /// Drag a turret. The placement is clamped to the canvas; the fire loop sees it on its next tick.
    pub fn move_turret(
        &mut self,
        id: &TurretId,
        placement: TurretPlacement,
    ) -> Result<TurretPlacement, TurretError> {
        if self.status_rx.borrow().is_active() {
            return Err(TurretError::PlacementLocked);
        }
        let placement = self.geometry.clamp_placement(placement, TURRET_SIZE_PX);
        self.entry_mut(id)?.placement_tx.send_replace(placement);
        Ok(placement)
    }

    /// Remove a turret and wait for its fire loop to stop.
    pub async fn remove_turret(&mut self, id: &TurretId) -> Result<AutoFireStats, TurretError> {
        let index = self
            .turrets
            .iter()
            .position(|entry| &entry.turret.id == id)
            .ok_or_else(|| TurretError::NotFound(id.clone()))?;
        let entry = self.turrets.remove(index);
        let stats = stop_entry(entry).await;
        info!(turret_id = %id, fired = stats.fired, "turret removed");
        Ok(stats)
    }

    pub fn turrets(&self) -> Vec<TurretSnapshot> {
        self.turrets
            .iter()
            .map(|entry| TurretSnapshot {
                turret: entry.turret.clone(),
                placement: *entry.placement_tx.borrow(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.turrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turrets.is_empty()
    }

    /// Cancel every fire loop; returns their stats in creation order.
    pub async fn shutdown(self) -> Vec<AutoFireStats> {
        let mut all = Vec::with_capacity(self.turrets.len());
        for entry in self.turrets {
            all.push(stop_entry(entry).await);
        }
        all
    }

    fn entry_mut(&mut self, id: &TurretId) -> Result<&mut TurretEntry, TurretError> {
        self.turrets
            .iter_mut()
            .find(|entry| &entry.turret.id == id)
            .ok_or_else(|| TurretError::NotFound(id.clone()))
    }
}

async fn stop_entry(entry: TurretEntry) -> AutoFireStats {
    // notify_one keeps a permit, so a loop that is mid-tick still sees it.
    entry.shutdown.notify_one();
    match entry.task.await {
        Ok(stats) => stats,
        Err(err) => {
            warn!(turret_id = %entry.turret.id, error = %err, "fire loop task failed");
            AutoFireStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BalloonPosition;
    use crate::use_cases::test_support::{TickDriver, manual_ticker};
    use std::sync::Mutex;

    struct Board {
        board: TurretBoard,
        status_tx: watch::Sender<GameStatus>,
        _balloons_tx: watch::Sender<Arc<BalloonPositionSet>>,
        commands_rx: mpsc::Receiver<PopCommand>,
        // One driver per turret, in creation order.
        drivers: Arc<Mutex<Vec<TickDriver>>>,
    }

    impl Board {
        fn take_driver(&self, index: usize) -> TickDriver {
            self.drivers.lock().unwrap().remove(index)
        }
    }

    fn board() -> Board {
        let (status_tx, status_rx) = watch::channel(GameStatus::NotStarted);
        let set: BalloonPositionSet = [
            BalloonPosition::new("west", 10.0, 0.0),
            BalloonPosition::new("east", 190.0, 0.0),
        ]
        .into_iter()
        .collect();
        let (balloons_tx, balloons_rx) = watch::channel(Arc::new(set));
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let drivers = Arc::new(Mutex::new(Vec::new()));

        let factory_drivers = drivers.clone();
        let factory: TickerFactory = Arc::new(move || {
            let (ticker, driver) = manual_ticker();
            factory_drivers.lock().unwrap().push(driver);
            Box::new(ticker) as Box<dyn Ticker>
        });

        Board {
            board: TurretBoard::new(
                CanvasGeometry::default(),
                status_rx,
                balloons_rx,
                commands_tx,
                factory,
            ),
            status_tx,
            _balloons_tx: balloons_tx,
            commands_rx,
            drivers,
        }
    }

    #[tokio::test]
    async fn when_turrets_are_added_then_each_fires_at_its_nearest_balloon() {
        let mut b = board();
        let west = b.board.add_turret(TurretPlacement { left: 40.0, top: 260.0 }, 0);
        let east = b.board.add_turret(TurretPlacement { left: 760.0, top: 260.0 }, 2);
        let mut west_driver = b.take_driver(0);
        let mut east_driver = b.take_driver(0);
        b.status_tx.send_replace(GameStatus::InProgress);

        west_driver.step().await;
        east_driver.step().await;

        assert_eq!(
            b.commands_rx.try_recv().unwrap(),
            PopCommand {
                turret_id: west,
                loon_id: "west".to_string()
            }
        );
        assert_eq!(
            b.commands_rx.try_recv().unwrap(),
            PopCommand {
                turret_id: east,
                loon_id: "east".to_string()
            }
        );
    }

    #[tokio::test]
    async fn when_turret_is_added_off_canvas_then_placement_is_clamped() {
        let mut b = board();

        b.board.add_turret(TurretPlacement { left: -100.0, top: 9_999.0 }, 0);

        let snapshot = &b.board.turrets()[0];
        assert_eq!(snapshot.placement, TurretPlacement { left: 16.0, top: 504.0 });
        assert_eq!(snapshot.turret.level, 0);
    }

    #[tokio::test]
    async fn when_game_is_in_progress_then_moving_is_rejected() {
        let mut b = board();
        let id = b.board.add_turret(TurretPlacement { left: 40.0, top: 260.0 }, 0);

        let moved = b.board.move_turret(&id, TurretPlacement { left: 400.0, top: 100.0 });
        assert_eq!(moved, Ok(TurretPlacement { left: 400.0, top: 100.0 }));

        b.status_tx.send_replace(GameStatus::InProgress);
        assert_eq!(
            b.board.move_turret(&id, TurretPlacement { left: 10.0, top: 10.0 }),
            Err(TurretError::PlacementLocked)
        );
        assert_eq!(
            b.board.turrets()[0].placement,
            TurretPlacement { left: 400.0, top: 100.0 }
        );
    }

    #[tokio::test]
    async fn when_turret_levels_up_then_snapshot_reflects_new_level() {
        let mut b = board();
        let id = b.board.add_turret(TurretPlacement { left: 40.0, top: 260.0 }, 1);

        assert_eq!(b.board.level_up(&id), Ok(2));
        assert_eq!(b.board.turrets()[0].turret.level, 2);
        assert_eq!(
            b.board.level_up(&TurretId::from("missing")),
            Err(TurretError::NotFound(TurretId::from("missing")))
        );
    }

    #[tokio::test]
    async fn when_turret_is_removed_then_its_loop_stops() {
        let mut b = board();
        let id = b.board.add_turret(TurretPlacement { left: 40.0, top: 260.0 }, 0);
        let mut driver = b.take_driver(0);
        b.status_tx.send_replace(GameStatus::InProgress);
        driver.step().await;

        let stats = b.board.remove_turret(&id).await.unwrap();

        assert_eq!(stats.fired, 1);
        assert!(b.board.is_empty());
        assert!(matches!(
            b.board.remove_turret(&id).await,
            Err(TurretError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn when_board_shuts_down_then_all_loops_report_stats() {
        let mut b = board();
        b.board.add_turret(TurretPlacement { left: 40.0, top: 260.0 }, 0);
        b.board.add_turret(TurretPlacement { left: 760.0, top: 260.0 }, 0);

        let stats = b.board.shutdown().await;

        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.fired == 0));
    }
}

// Framework bootstrap for the headless turret client.

use crate::domain::{CanvasGeometry, Ticker};
use crate::frameworks::config;
use crate::frameworks::layout::{TurretLayout, load_layout};
use crate::interface_adapters::clock::{IntervalTicker, SystemClock};
use crate::interface_adapters::protocol::ClientCommand;
use crate::interface_adapters::relay_client::{ConnectionState, RelayClient, RelayClientSettings};
use crate::use_cases::{
    ClientMessageRouter, ClientState, PopCommand, RoundEndMatcher, TickerFactory, TurretBoard,
};

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use std::{io::Result, sync::Arc};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info, warn};

/// Everything `run` needs; built from the environment by `run_with_config`.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub relay: RelayClientSettings,
    pub geometry: CanvasGeometry,
    pub fire_interval: Duration,
    pub round_end_sentinel: String,
    pub end_game_on_round_end: bool,
    // Send start_game once the first connection is up. When off the client only
    // spectates: it tracks balloons and messages but the game never starts, so
    // turrets never fire.
    pub auto_start: bool,
    pub history_limit: usize,
    pub layout: TurretLayout,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));

    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Run the client until `shutdown` resolves, then cancel every turret and close the relay socket.
pub async fn run(settings: ClientSettings, shutdown: impl Future<Output = ()>) -> Result<()> {
    let state = Arc::new(ClientState::new(
        settings.history_limit,
        settings.end_game_on_round_end,
    ));

    let (relay_tx, relay_rx) = mpsc::channel::<ClientCommand>(config::RELAY_COMMAND_CAPACITY);
    let (pop_tx, pop_rx) = mpsc::channel::<PopCommand>(config::POP_COMMAND_CAPACITY);
    let (connection_tx, mut connection_rx) = watch::channel(ConnectionState::Disconnected);
    let relay_shutdown = Arc::new(Notify::new());

    let relay_task = tokio::spawn(
        RelayClient {
            settings: settings.relay.clone(),
            router: ClientMessageRouter::new(
                SystemClock,
                RoundEndMatcher::new(settings.round_end_sentinel.clone()),
            ),
            sink: state.clone(),
            commands_rx: relay_rx,
            connection_tx,
            shutdown: relay_shutdown.clone(),
        }
        .run(),
    );
    let pump_task = tokio::spawn(pump_pop_commands(pop_rx, relay_tx.clone()));

    let fire_interval = settings.fire_interval;
    let ticker_factory: TickerFactory =
        Arc::new(move || Box::new(IntervalTicker::new(fire_interval)) as Box<dyn Ticker>);
    let mut board = TurretBoard::new(
        settings.geometry,
        state.subscribe_status(),
        state.subscribe_balloons(),
        pop_tx,
        ticker_factory,
    );
    for spec in &settings.layout.turrets {
        board.add_turret(spec.placement(), spec.level);
    }
    if !settings.auto_start {
        info!("auto start disabled; spectating without firing");
    }
    info!(
        turrets = board.len(),
        fire_interval_ms = fire_interval.as_millis() as u64,
        auto_start = settings.auto_start,
        "client configured"
    );

    let mut status_rx = state.subscribe_status();
    let mut start_sent = false;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }

            changed = connection_rx.changed() => {
                if changed.is_err() {
                    warn!("relay connection task stopped");
                    break;
                }
                let connection = *connection_rx.borrow_and_update();
                info!(?connection, "relay connection state changed");

                if connection == ConnectionState::Connected {
                    if settings.auto_start && !start_sent {
                        start_sent = true;
                        start_game(&state, &relay_tx).await;
                    } else if state.status().is_active() {
                        // A restarted relay forgets the subscription; ask for balloons again.
                        resubscribe(&relay_tx).await;
                    }
                }
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                info!(?status, "game status changed");
            }
        }
    }

    let stats = board.shutdown().await;
    let fired: u64 = stats.iter().map(|s| s.fired).sum();
    let dropped: u64 = stats.iter().map(|s| s.dropped).sum();

    relay_shutdown.notify_one();
    drop(relay_tx);
    if let Err(e) = pump_task.await {
        warn!(error = %e, "pop command pump failed");
    }
    if let Err(e) = relay_task.await {
        warn!(error = %e, "relay connection task failed");
    }

    info!(
        fired,
        dropped,
        rounds_ended = state.rounds_ended(),
        messages = state.messages().len(),
        "client stopped"
    );
    Ok(())
}

async fn start_game(state: &ClientState, relay_tx: &mpsc::Sender<ClientCommand>) {
    if relay_tx.send(ClientCommand::StartGame).await.is_err() {
        warn!("relay connection task stopped; cannot start game");
        return;
    }
    match state.start_game() {
        Ok(status) => info!(?status, "game started"),
        Err(e) => warn!(error = %e, "game already started"),
    }
}

async fn resubscribe(relay_tx: &mpsc::Sender<ClientCommand>) {
    match relay_tx.send(ClientCommand::StartGame).await {
        Ok(()) => info!("game in progress; resubscribed to balloon state"),
        Err(_) => warn!("relay connection task stopped; cannot resubscribe"),
    }
}

// Fan-in point: every turret's pops leave through the single relay socket.
async fn pump_pop_commands(
    mut pop_rx: mpsc::Receiver<PopCommand>,
    relay_tx: mpsc::Sender<ClientCommand>,
) {
    let mut last_drop_log = Instant::now() - LOG_THROTTLE;
    let mut dropped: u64 = 0;

    while let Some(PopCommand { turret_id, loon_id }) = pop_rx.recv().await {
        debug!(%turret_id, %loon_id, "popping balloon");
        if let Err(e) = relay_tx.try_send(ClientCommand::PopLoon(loon_id)) {
            dropped += 1;
            if last_drop_log.elapsed() >= LOG_THROTTLE {
                last_drop_log = Instant::now();
                warn!(error = %e, dropped, "relay queue full; dropping pop");
            }
        }
    }
}

fn settings_from_env() -> Result<ClientSettings> {
    let url = config::relay_ws_url().map_err(|e| {
        tracing::error!(error = %e, "invalid client configuration");
        std::io::Error::other(e)
    })?;

    let geometry = CanvasGeometry::with_scale(config::canvas_scale());
    let layout = match config::turret_layout_path() {
        Some(path) => load_layout(Path::new(&path)).map_err(|e| {
            tracing::error!(%path, error = %e, "invalid turret layout");
            std::io::Error::other(e)
        })?,
        None => TurretLayout::single_default(&geometry),
    };

    Ok(ClientSettings {
        relay: RelayClientSettings {
            url,
            connect_timeout: config::connect_timeout(),
            reconnect_min: config::reconnect_min(),
            reconnect_max: config::reconnect_max(),
            heartbeat_interval: config::heartbeat_interval(),
            idle_timeout: config::idle_timeout(),
        },
        geometry,
        fire_interval: config::fire_interval(),
        round_end_sentinel: config::round_end_sentinel(),
        end_game_on_round_end: config::end_game_on_round_end(),
        auto_start: config::auto_start(),
        history_limit: config::message_history_limit(),
        layout,
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let settings = settings_from_env()?;

    run(settings, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    })
    .await
}

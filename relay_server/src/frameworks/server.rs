// Framework bootstrap for the relay runtime.

use crate::frameworks::config;
use crate::interface_adapters::http::status_handler;
use crate::interface_adapters::net::{UpstreamSettings, upstream_task, ws_handler};
use crate::interface_adapters::protocol::UpstreamCommand;
use crate::interface_adapters::state::{AppState, HeartbeatSettings};
use crate::use_cases::RelaySession;

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};
use tokio::sync::mpsc;

/// Everything `run` needs; built from the environment by `run_with_config`.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub upstream: UpstreamSettings,
    pub heartbeat: HeartbeatSettings,
}

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

    // wss upstreams need a process-wide TLS provider; a second install is harmless.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

pub fn app(state: Arc<AppState>) -> Router {
    // The browser client connects to the bare origin; `/ws` is kept for tooling.
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

pub async fn run(listener: tokio::net::TcpListener, settings: RelaySettings) -> Result<()> {
    let address = listener.local_addr()?;

    let (upstream_tx, upstream_rx) =
        mpsc::channel::<UpstreamCommand>(config::UPSTREAM_COMMAND_CAPACITY);
    let session = Arc::new(RelaySession::new(upstream_tx));
    let state = Arc::new(AppState {
        session: session.clone(),
        heartbeat: settings.heartbeat,
        downstream_frame_capacity: config::DOWNSTREAM_FRAME_CAPACITY,
    });

    // The upstream connection lives for the whole process, independent of clients.
    tracing::debug!(
        upstream = %settings.upstream.redacted_url(),
        heartbeat_ms = settings.heartbeat.interval.as_millis() as u64,
        idle_timeout_ms = settings.heartbeat.idle_timeout.as_millis() as u64,
        "relay configured"
    );
    tokio::spawn(upstream_task(session, upstream_rx, settings.upstream));

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app(state)).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

fn settings_from_env() -> Result<RelaySettings> {
    let url = config::upstream_ws_url().map_err(|e| {
        tracing::error!(error = %e, "invalid relay configuration");
        std::io::Error::other(e)
    })?;

    let heartbeat = HeartbeatSettings {
        interval: config::heartbeat_interval(),
        idle_timeout: config::idle_timeout(),
    };

    Ok(RelaySettings {
        upstream: UpstreamSettings {
            url,
            connect_timeout: config::upstream_connect_timeout(),
            reconnect_min: config::upstream_reconnect_min(),
            reconnect_max: config::upstream_reconnect_max(),
            heartbeat_interval: heartbeat.interval,
            idle_timeout: heartbeat.idle_timeout,
        },
        heartbeat,
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let settings = settings_from_env()?;
    let address = SocketAddr::new(config::http_host(), config::http_port());

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener, settings).await
}

// Upstream telemetry connection: connect, subscribe, forward, reconnect with backoff.

use crate::domain::{Backoff, UpstreamStatus};
use crate::interface_adapters::protocol::{UpstreamCommand, encode_upstream_command};
use crate::use_cases::{ForwardOutcome, RelaySession};

use axum::extract::ws::Utf8Bytes;
use futures_util::{SinkExt, StreamExt};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, info, warn};
use url::Url;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    // Full websocket URL, access token included; never logged verbatim.
    pub url: Url,
    pub connect_timeout: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
}

impl UpstreamSettings {
    // Host and port only, so the token in the path stays out of the logs.
    pub fn redacted_url(&self) -> String {
        match (self.url.host_str(), self.url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}://{host}:{port}", self.url.scheme()),
            (Some(host), None) => format!("{}://{host}", self.url.scheme()),
            _ => self.url.scheme().to_string(),
        }
    }
}

#[derive(Debug)]
enum NetError {
    Ws(tungstenite::Error),
    Serialization(serde_json::Error),
    IdleTimeout,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Ws(err) => write!(f, "websocket error: {err}"),
            NetError::Serialization(err) => write!(f, "failed to encode command: {err}"),
            NetError::IdleTimeout => f.write_str("upstream idle timeout"),
        }
    }
}

impl From<tungstenite::Error> for NetError {
    fn from(e: tungstenite::Error) -> Self {
        NetError::Ws(e)
    }
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);

/// Owns the upstream socket for the lifetime of the process.
///
/// Commands queued while the socket is down are dropped; the session already rejects most of
/// them up front, this only covers the window between a drop and the status update.
pub async fn upstream_task(
    session: Arc<RelaySession>,
    mut commands_rx: mpsc::Receiver<UpstreamCommand>,
    settings: UpstreamSettings,
) {
    let mut backoff = Backoff::new(settings.reconnect_min, settings.reconnect_max);
    let upstream = settings.redacted_url();

    loop {
        session.set_upstream_status(UpstreamStatus::Connecting);
        debug!(%upstream, "connecting to upstream");

        match timeout(settings.connect_timeout, connect_async(settings.url.as_str())).await {
            Ok(Ok((socket, _response))) => {
                backoff.reset();
                session.set_upstream_status(UpstreamStatus::Connected);
                info!(%upstream, "upstream connected");

                match run_upstream_connection(socket, &session, &mut commands_rx, &settings).await
                {
                    Ok(ConnectionEnd::Closed) => info!("upstream closed the connection"),
                    Ok(ConnectionEnd::CommandsClosed) => {
                        session.set_upstream_status(UpstreamStatus::Disconnected);
                        info!("relay shutting down; upstream task exiting");
                        return;
                    }
                    Err(e) => warn!(error = %e, "upstream connection failed"),
                }
            }
            Ok(Err(e)) => warn!(%upstream, error = %e, "failed to connect to upstream"),
            Err(_) => warn!(
                %upstream,
                timeout_ms = settings.connect_timeout.as_millis() as u64,
                "upstream connect timed out"
            ),
        }

        session.set_upstream_status(UpstreamStatus::Disconnected);
        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "reconnecting to upstream");

        if !drop_commands_for(delay, &mut commands_rx).await {
            info!("relay shutting down; upstream task exiting");
            return;
        }
    }
}

enum ConnectionEnd {
    Closed,
    CommandsClosed,
}

// Wait out the backoff delay, discarding commands nobody can deliver.
// Returns false if the command channel closed.
async fn drop_commands_for(delay: Duration, commands_rx: &mut mpsc::Receiver<UpstreamCommand>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = commands_rx.recv() => match command {
                Some(command) => debug!(?command, "upstream unavailable; dropping command"),
                None => return false,
            },
        }
    }
}

async fn run_upstream_connection(
    mut socket: UpstreamSocket,
    session: &RelaySession,
    commands_rx: &mut mpsc::Receiver<UpstreamCommand>,
    settings: &UpstreamSettings,
) -> Result<ConnectionEnd, NetError> {
    // Subscriptions belong to the connection, so every (re)connect sends them again.
    for command in session.opening_subscriptions() {
        send_command(&mut socket, &command).await?;
        info!(?command, "subscribed upstream");
    }

    let mut heartbeat = tokio::time::interval(settings.heartbeat_interval);
    heartbeat.tick().await;

    let mut last_seen = Instant::now();
    let mut last_drop_log = Instant::now() - LOG_THROTTLE;
    let mut forwarded: u64 = 0;
    let mut dropped: u64 = 0;

    let end = loop {
        tokio::select! {
            incoming = socket.next() => {
                let payload = match incoming {
                    Some(Ok(Message::Text(text))) => Some(Utf8Bytes::from(text.as_str())),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => Some(Utf8Bytes::from(text)),
                        Err(e) => {
                            warn!(error = %e, "binary upstream frame is not utf-8; dropping");
                            None
                        }
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => None,
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "upstream sent close");
                        break ConnectionEnd::Closed;
                    }
                    Some(Err(e)) => return Err(NetError::Ws(e)),
                    None => break ConnectionEnd::Closed,
                };
                last_seen = Instant::now();

                if let Some(payload) = payload {
                    match session.forward_upstream(payload).await {
                        ForwardOutcome::Delivered => forwarded += 1,
                        ForwardOutcome::NoDownstream => {
                            dropped += 1;
                            debug!("no downstream client; dropping upstream frame");
                        }
                        outcome @ (ForwardOutcome::DownstreamFull | ForwardOutcome::DownstreamClosed) => {
                            dropped += 1;
                            if last_drop_log.elapsed() >= LOG_THROTTLE {
                                last_drop_log = Instant::now();
                                warn!(?outcome, dropped, "downstream not keeping up; dropping upstream frame");
                            }
                        }
                    }
                }
            }

            command = commands_rx.recv() => match command {
                Some(command) => send_command(&mut socket, &command).await?,
                None => {
                    let _ = socket.close(None).await;
                    break ConnectionEnd::CommandsClosed;
                }
            },

            _ = heartbeat.tick() => {
                if last_seen.elapsed() >= settings.idle_timeout {
                    return Err(NetError::IdleTimeout);
                }
                socket.send(Message::Ping(Default::default())).await?;
            }
        }
    };

    debug!(forwarded, dropped, "upstream connection stats");
    Ok(end)
}

async fn send_command(socket: &mut UpstreamSocket, command: &UpstreamCommand) -> Result<(), NetError> {
    let txt = encode_upstream_command(command).map_err(NetError::Serialization)?;
    socket.send(Message::Text(txt.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> UpstreamSettings {
        UpstreamSettings {
            url: Url::parse(url).unwrap(),
            connect_timeout: Duration::from_secs(1),
            reconnect_min: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(3),
        }
    }

    #[test]
    fn when_url_carries_a_token_then_redacted_url_keeps_only_host() {
        let settings = settings("wss://example.ngrok-free.app/SECRETTOKEN/ws");

        assert_eq!(settings.redacted_url(), "wss://example.ngrok-free.app:443");
    }

    #[tokio::test(start_paused = true)]
    async fn when_commands_arrive_during_backoff_then_they_are_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(UpstreamCommand::Subscribe(
            crate::interface_adapters::protocol::Topic::LoonState,
        ))
        .await
        .unwrap();

        assert!(drop_commands_for(Duration::from_millis(50), &mut rx).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn when_command_channel_closes_during_backoff_then_task_stops_waiting() {
        let (tx, mut rx) = mpsc::channel::<UpstreamCommand>(4);
        drop(tx);

        assert!(!drop_commands_for(Duration::from_secs(60), &mut rx).await);
    }
}

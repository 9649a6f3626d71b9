// Connection to the relay: one socket shared by every turret, reconnected forever.

use crate::domain::{Backoff, BalloonPositionSet, Clock, FrameSink};
use crate::interface_adapters::protocol::{ClientCommand, FrameError, encode_client_command};
use crate::use_cases::{ClientMessageRouter, RouteOutcome};

use futures_util::{SinkExt, StreamExt};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, info, warn};
use url::Url;

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct RelayClientSettings {
    pub url: Url,
    pub connect_timeout: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
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
            NetError::IdleTimeout => f.write_str("relay idle timeout"),
        }
    }
}

impl From<tungstenite::Error> for NetError {
    fn from(e: tungstenite::Error) -> Self {
        NetError::Ws(e)
    }
}

enum ConnectionEnd {
    Closed,
    Shutdown,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

/// Everything the connection task owns besides the socket.
pub struct RelayClient<C> {
    pub settings: RelayClientSettings,
    pub router: ClientMessageRouter<C>,
    pub sink: Arc<dyn FrameSink>,
    pub commands_rx: mpsc::Receiver<ClientCommand>,
    pub connection_tx: watch::Sender<ConnectionState>,
    pub shutdown: Arc<Notify>,
}

impl<C: Clock> RelayClient<C> {
    /// Connect, route frames, send commands; reconnect with backoff until shut down.
    ///
    /// Commands issued while disconnected are dropped.
    pub async fn run(mut self) {
        let mut backoff = Backoff::new(self.settings.reconnect_min, self.settings.reconnect_max);
        let relay = self.settings.url.to_string();

        loop {
            self.connection_tx.send_replace(ConnectionState::Connecting);
            debug!(%relay, "connecting to relay");

            let connect = timeout(self.settings.connect_timeout, connect_async(relay.as_str()));
            let attempt = tokio::select! {
                _ = self.shutdown.notified() => break,
                attempt = connect => attempt,
            };

            match attempt {
                Ok(Ok((socket, _response))) => {
                    backoff.reset();
                    self.connection_tx.send_replace(ConnectionState::Connected);
                    info!(%relay, "connected to relay");

                    match self.run_connection(socket).await {
                        Ok(ConnectionEnd::Closed) => info!("relay closed the connection"),
                        Ok(ConnectionEnd::Shutdown) => break,
                        Err(e) => warn!(error = %e, "relay connection failed"),
                    }
                    self.forget_balloons();
                }
                Ok(Err(e)) => warn!(%relay, error = %e, "failed to connect to relay"),
                Err(_) => warn!(
                    %relay,
                    timeout_ms = self.settings.connect_timeout.as_millis() as u64,
                    "relay connect timed out"
                ),
            }

            self.connection_tx.send_replace(ConnectionState::Disconnected);
            let delay = backoff.next_delay();
            info!(delay_ms = delay.as_millis() as u64, "reconnecting to relay");

            if !self.drop_commands_for(delay).await {
                break;
            }
        }

        self.connection_tx.send_replace(ConnectionState::Disconnected);
        info!("relay connection task exiting");
    }

    // Positions from a lost connection are stale; turrets hold fire until a fresh frame.
    fn forget_balloons(&self) {
        debug!("relay connection lost; clearing balloon state");
        self.sink.replace_balloons(BalloonPositionSet::new());
    }

    // Returns false on shutdown.
    async fn drop_commands_for(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.shutdown.notified() => return false,
                command = self.commands_rx.recv() => match command {
                    Some(command) => debug!(?command, "relay unavailable; dropping command"),
                    None => return false,
                },
            }
        }
    }

    async fn run_connection(&mut self, mut socket: RelaySocket) -> Result<ConnectionEnd, NetError> {
        let mut heartbeat = tokio::time::interval(self.settings.heartbeat_interval);
        heartbeat.tick().await;

        let mut last_seen = Instant::now();
        let mut last_invalid_log = Instant::now() - LOG_THROTTLE;
        let mut frames_in: u64 = 0;
        let mut commands_out: u64 = 0;

        let end = loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let _ = socket.close(None).await;
                    break ConnectionEnd::Shutdown;
                }

                incoming = socket.next() => {
                    let text = match incoming {
                        Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text,
                            Err(e) => {
                                if should_log(&mut last_invalid_log) {
                                    warn!(error = %e, "binary relay frame is not utf-8; dropping");
                                }
                                continue;
                            }
                        },
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                            last_seen = Instant::now();
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "relay sent close");
                            break ConnectionEnd::Closed;
                        }
                        Some(Err(e)) => return Err(NetError::Ws(e)),
                        None => break ConnectionEnd::Closed,
                    };
                    last_seen = Instant::now();
                    frames_in += 1;
                    self.route_frame(&text, &mut last_invalid_log);
                }

                command = self.commands_rx.recv() => match command {
                    Some(command) => {
                        send_command(&mut socket, &command).await?;
                        commands_out += 1;
                    }
                    None => {
                        let _ = socket.close(None).await;
                        break ConnectionEnd::Shutdown;
                    }
                },

                _ = heartbeat.tick() => {
                    if last_seen.elapsed() >= self.settings.idle_timeout {
                        return Err(NetError::IdleTimeout);
                    }
                    socket.send(Message::Ping(Default::default())).await?;
                }
            }
        };

        debug!(frames_in, commands_out, "relay connection stats");
        Ok(end)
    }

    // Bad frames are logged and dropped; they never end the connection.
    fn route_frame(&self, text: &str, last_invalid_log: &mut Instant) {
        match self.router.route_text(text, self.sink.as_ref()) {
            Ok(RouteOutcome::Ignored) => {}
            Ok(outcome) => debug!(?outcome, "frame routed"),
            Err(FrameError::InvalidJson(e)) => {
                if should_log(last_invalid_log) {
                    warn!(bytes = text.len(), error = %e, "failed to parse relay frame");
                }
            }
            Err(e) => {
                if should_log(last_invalid_log) {
                    warn!(error = %e, "dropping relay frame");
                }
            }
        }
    }
}

async fn send_command(socket: &mut RelaySocket, command: &ClientCommand) -> Result<(), NetError> {
    let txt = encode_client_command(command).map_err(NetError::Serialization)?;
    socket.send(Message::Text(txt.into())).await?;
    Ok(())
}

use crate::interface_adapters::protocol::DecodeError;
use crate::interface_adapters::state::{AppState, HeartbeatSettings};
use crate::interface_adapters::utils::conn_id::next_conn_id;
use crate::use_cases::{CommandError, DownstreamHandle, RelaySession};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Notify, mpsc};
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    Ws(axum::Error),
    FramesClosed,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Ws(err) => write!(f, "websocket error: {err}"),
            NetError::FramesClosed => f.write_str("downstream frame channel closed"),
        }
    }
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let session = state.session.clone();
    let heartbeat = state.heartbeat;
    let frame_capacity = state.downstream_frame_capacity;
    ws.on_upgrade(move |socket| {
        let conn_id = next_conn_id();
        handle_socket(socket, session, heartbeat, frame_capacity, conn_id)
            .instrument(info_span!("conn", conn_id))
    })
}

struct ConnCtx {
    pub conn_id: u64,
    pub session: Arc<RelaySession>,
    pub heartbeat: HeartbeatSettings,
    // Frames the session forwards from upstream, in arrival order.
    pub frames_rx: mpsc::Receiver<Utf8Bytes>,
    // Signalled when a newer client replaces this one.
    pub shutdown: Arc<Notify>,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,
    pub rejected: u32,

    pub last_seen: Instant,
    pub last_invalid_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

async fn handle_socket(
    mut socket: WebSocket,
    session: Arc<RelaySession>,
    heartbeat: HeartbeatSettings,
    frame_capacity: usize,
    conn_id: u64,
) {
    let (frames_tx, frames_rx) = mpsc::channel::<Utf8Bytes>(frame_capacity);
    let shutdown = Arc::new(Notify::new());

    // Attach before reading anything so no upstream frame is missed after the upgrade.
    session
        .attach_downstream(DownstreamHandle {
            conn_id,
            frames_tx,
            shutdown: shutdown.clone(),
        })
        .await;
    info!("client connected");

    let now = Instant::now();
    let mut ctx = ConnCtx {
        conn_id,
        session: session.clone(),
        heartbeat,
        frames_rx,
        shutdown,
        msgs_in: 0,
        msgs_out: 0,
        bytes_in: 0,
        bytes_out: 0,
        invalid_json: 0,
        rejected: 0,
        last_seen: now,
        last_invalid_log: now - LOG_THROTTLE,
        close_frame: None,
    };

    // Main Client Loop
    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = %e, "client loop exited with error");
    }

    // Only clears the slot if a newer client has not already taken it.
    session.detach_downstream(conn_id).await;

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        rejected = ctx.rejected,
        "connection stats"
    );
    info!("client disconnected");
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut heartbeat = tokio::time::interval(ctx.heartbeat.interval);
    // The first tick completes immediately; nothing to check yet.
    heartbeat.tick().await;

    let mut fatal: Option<NetError> = None;

    loop {
        // disconnect becomes true on error or close
        let disconnect: bool = tokio::select! {
            // Incoming command from the client
            incoming = socket.recv() => {
                match handle_incoming_ws(incoming, ctx) {
                    LoopControl::Continue => false,
                    LoopControl::Disconnect => true,
                }
            }

            // Upstream frame to forward verbatim
            frame = ctx.frames_rx.recv() => {
                match frame {
                    Some(bytes) => match forward_frame(bytes, socket, ctx).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    None => {
                        fatal = Some(NetError::FramesClosed);
                        true
                    }
                }
            }

            // A newer client took the downstream slot.
            _ = ctx.shutdown.notified() => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "connection replaced".into(),
                });
                info!("connection replaced by newer client");
                true
            }

            _ = heartbeat.tick() => {
                if ctx.last_seen.elapsed() >= ctx.heartbeat.idle_timeout {
                    ctx.close_frame = Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "idle timeout".into(),
                    });
                    warn!(
                        idle_ms = ctx.last_seen.elapsed().as_millis() as u64,
                        "client idle; disconnecting"
                    );
                    true
                } else if let Err(e) = socket.send(Message::Ping(Default::default())).await {
                    debug!(error = %e, "failed to send ping");
                    true
                } else {
                    false
                }
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = %err, "socket close error");
            }
            break;
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn handle_incoming_ws(incoming: Option<Result<Message, Error>>, ctx: &mut ConnCtx) -> LoopControl {
    match incoming {
        Some(Ok(msg)) => {
            ctx.last_seen = Instant::now();
            match msg {
                Message::Text(text) => {
                    handle_client_text(text.as_str(), ctx);
                    LoopControl::Continue
                }
                // Some clients send JSON as binary frames; treat them as UTF-8 text.
                Message::Binary(bytes) => {
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => handle_client_text(text, ctx),
                        Err(e) => {
                            ctx.invalid_json += 1;
                            if should_log(&mut ctx.last_invalid_log) {
                                warn!(error = %e, "binary client frame is not utf-8; ignoring");
                            }
                        }
                    }
                    LoopControl::Continue
                }
                Message::Ping(_) | Message::Pong(_) => LoopControl::Continue,
                Message::Close(_) => LoopControl::Disconnect,
            }
        }
        Some(Err(e)) => {
            warn!(conn_id = ctx.conn_id, error = %e, "websocket recv error");
            LoopControl::Disconnect
        }
        None => {
            info!(conn_id = ctx.conn_id, "websocket closed");
            LoopControl::Disconnect
        }
    }
}

// Bad commands are logged and ignored; they never close the connection.
fn handle_client_text(text: &str, ctx: &mut ConnCtx) {
    ctx.msgs_in += 1;
    ctx.bytes_in += text.len() as u64;

    match ctx.session.handle_client_text(text) {
        Ok(command) => debug!(?command, "client command relayed"),
        Err(CommandError::Decode(DecodeError::InvalidJson(e))) => {
            ctx.invalid_json += 1;
            if should_log(&mut ctx.last_invalid_log) {
                warn!(bytes = text.len(), error = %e, "failed to parse client message");
            }
        }
        Err(CommandError::Decode(e)) => {
            ctx.rejected += 1;
            info!(error = %e, "ignoring client message");
        }
        Err(CommandError::UpstreamUnavailable) => {
            ctx.rejected += 1;
            if should_log(&mut ctx.last_invalid_log) {
                warn!("upstream unavailable; dropping client command");
            }
        }
    }
}

async fn forward_frame(frame: Utf8Bytes, socket: &mut WebSocket, ctx: &mut ConnCtx) -> LoopControl {
    let bytes_len = frame.len();
    match socket.send(Message::Text(frame)).await.map_err(NetError::Ws) {
        Ok(()) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Log unexpected send failures; disconnect will follow immediately.
            warn!(error = %err, "failed to forward upstream frame");
            LoopControl::Disconnect
        }
    }
}

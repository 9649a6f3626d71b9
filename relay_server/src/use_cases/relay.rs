// Relay session: one upstream telemetry connection, zero-or-one downstream client.

use crate::domain::{SessionStatus, UpstreamStatus};
use crate::interface_adapters::protocol::{
    ClientCommand, DecodeError, Topic, UpstreamCommand, decode_client_command,
};
use axum::extract::ws::Utf8Bytes;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, RwLock, mpsc, watch};
use tracing::{debug, info};

/// The active downstream connection as seen by the session.
///
/// Frames are pushed through `frames_tx` so a single task owns the socket and ordering is kept.
#[derive(Debug, Clone)]
pub struct DownstreamHandle {
    pub conn_id: u64,
    pub frames_tx: mpsc::Sender<Utf8Bytes>,
    // Signalled when a newer connection takes over the slot.
    pub shutdown: Arc<Notify>,
}

/// What happened to an upstream frame offered to the downstream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    NoDownstream,
    DownstreamFull,
    DownstreamClosed,
}

#[derive(Debug)]
pub enum CommandError {
    Decode(DecodeError),
    UpstreamUnavailable,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Decode(err) => write!(f, "{err}"),
            CommandError::UpstreamUnavailable => f.write_str("upstream unavailable"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<DecodeError> for CommandError {
    fn from(err: DecodeError) -> Self {
        CommandError::Decode(err)
    }
}

pub struct RelaySession {
    // Control frames headed to the upstream task.
    upstream_tx: mpsc::Sender<UpstreamCommand>,
    upstream_status: watch::Sender<UpstreamStatus>,
    downstream: RwLock<Option<DownstreamHandle>>,
    // Set once a client started the game; replayed on every upstream reconnect.
    loon_state_subscribed: AtomicBool,
}

impl RelaySession {
    pub fn new(upstream_tx: mpsc::Sender<UpstreamCommand>) -> Self {
        let (upstream_status, _rx) = watch::channel(UpstreamStatus::Connecting);
        Self {
            upstream_tx,
            upstream_status,
            downstream: RwLock::new(None),
            loon_state_subscribed: AtomicBool::new(false),
        }
    }

    /// Store `handle` as the active downstream connection, replacing any prior one.
    pub async fn attach_downstream(&self, handle: DownstreamHandle) {
        let conn_id = handle.conn_id;
        let previous = self.downstream.write().await.replace(handle);

        if let Some(previous) = previous {
            // The replaced socket closes itself once it observes the signal.
            previous.shutdown.notify_one();
            info!(
                conn_id,
                replaced_conn_id = previous.conn_id,
                "downstream connection replaced"
            );
        } else {
            info!(conn_id, "downstream connection attached");
        }
    }

    /// Clear the active downstream slot if `conn_id` still owns it.
    pub async fn detach_downstream(&self, conn_id: u64) -> bool {
        let mut slot = self.downstream.write().await;
        match slot.as_ref() {
            Some(current) if current.conn_id == conn_id => {
                *slot = None;
                info!(conn_id, "downstream connection detached");
                true
            }
            _ => false,
        }
    }

    /// Offer an upstream frame to the downstream client. Nothing is buffered for later.
    pub async fn forward_upstream(&self, payload: Utf8Bytes) -> ForwardOutcome {
        let slot = self.downstream.read().await;
        let Some(downstream) = slot.as_ref() else {
            return ForwardOutcome::NoDownstream;
        };

        match downstream.frames_tx.try_send(payload) {
            Ok(()) => ForwardOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => ForwardOutcome::DownstreamFull,
            Err(mpsc::error::TrySendError::Closed(_)) => ForwardOutcome::DownstreamClosed,
        }
    }

    /// Translate one downstream text frame into an upstream control frame.
    pub fn handle_client_text(&self, text: &str) -> Result<UpstreamCommand, CommandError> {
        let command = decode_client_command(text)?;

        if command == ClientCommand::StartGame {
            // Remember the intent even if the upstream is down; it is replayed on connect.
            self.loon_state_subscribed.store(true, Ordering::Relaxed);
        }

        let upstream = UpstreamCommand::from(command);
        if !self.upstream_status.borrow().is_connected() {
            return Err(CommandError::UpstreamUnavailable);
        }

        self.upstream_tx
            .try_send(upstream.clone())
            .map_err(|_| CommandError::UpstreamUnavailable)?;
        debug!(command = ?upstream, "queued upstream command");
        Ok(upstream)
    }

    /// Subscriptions to send right after an upstream connection opens.
    pub fn opening_subscriptions(&self) -> Vec<UpstreamCommand> {
        let mut commands = vec![UpstreamCommand::Subscribe(Topic::Msg)];
        if self.loon_state_subscribed.load(Ordering::Relaxed) {
            commands.push(UpstreamCommand::Subscribe(Topic::LoonState));
        }
        commands
    }

    pub fn set_upstream_status(&self, status: UpstreamStatus) {
        self.upstream_status.send_replace(status);
    }

    pub async fn status(&self) -> SessionStatus {
        // Copy out of the watch guard before awaiting the downstream lock.
        let upstream = *self.upstream_status.borrow();
        SessionStatus {
            upstream,
            downstream_attached: self.downstream.read().await.is_some(),
            loon_state_subscribed: self.loon_state_subscribed.load(Ordering::Relaxed),
        }
    }
}

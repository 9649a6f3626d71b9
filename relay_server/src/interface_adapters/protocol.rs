// Wire protocol DTOs for the downstream client socket and the upstream telemetry socket.
// Upstream frames travelling to the client are forwarded verbatim and never decoded here.

use crate::domain::{SessionStatus, UpstreamStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Commands the downstream client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    // Begin receiving balloon telemetry.
    StartGame,
    // Pop the balloon with the given id.
    PopLoon(String),
}

// `{"type": .., "data": ..}`; dispatch happens on `type` alone.
#[derive(Debug, Deserialize)]
struct ClientEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Upstream topics the relay can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Topic {
    #[serde(rename = "msg")]
    Msg,
    #[serde(rename = "loonState")]
    LoonState,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Msg => f.write_str("msg"),
            Topic::LoonState => f.write_str("loonState"),
        }
    }
}

/// Control frames the relay sends to the upstream telemetry service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpstreamCommand {
    // {"subscribe": "<topic>"}
    Subscribe(Topic),
    // {"publish": {...}}
    Publish(PublishPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishPayload {
    PopLoon {
        #[serde(rename = "loonId")]
        loon_id: String,
    },
}

impl From<ClientCommand> for UpstreamCommand {
    fn from(command: ClientCommand) -> Self {
        match command {
            ClientCommand::StartGame => UpstreamCommand::Subscribe(Topic::LoonState),
            ClientCommand::PopLoon(loon_id) => {
                UpstreamCommand::Publish(PublishPayload::PopLoon { loon_id })
            }
        }
    }
}

#[derive(Debug)]
pub enum DecodeError {
    // Frame is not JSON at all.
    InvalidJson(serde_json::Error),
    // JSON without a `type` we know about.
    Unrecognized { kind: Option<String> },
    // Known `type` but the payload does not match it (e.g. pop_loon without a string id).
    Malformed { kind: String, reason: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidJson(err) => write!(f, "invalid json: {err}"),
            DecodeError::Unrecognized { kind: Some(kind) } => {
                write!(f, "unrecognized message type {kind:?}")
            }
            DecodeError::Unrecognized { kind: None } => f.write_str("message has no type"),
            DecodeError::Malformed { kind, reason } => write!(f, "malformed {kind}: {reason}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode one downstream text frame into a command.
///
/// `start_game` ignores any `data` it carries; `pop_loon` needs a string id.
pub fn decode_client_command(text: &str) -> Result<ClientCommand, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::InvalidJson)?;
    let Ok(envelope) = serde_json::from_value::<ClientEnvelope>(value) else {
        return Err(DecodeError::Unrecognized { kind: None });
    };

    match envelope.kind.as_deref() {
        Some("start_game") => Ok(ClientCommand::StartGame),
        Some("pop_loon") => match envelope.data {
            Value::String(loon_id) => Ok(ClientCommand::PopLoon(loon_id)),
            other => Err(DecodeError::Malformed {
                kind: "pop_loon".to_string(),
                reason: format!("expected string balloon id, got {other}"),
            }),
        },
        other => Err(DecodeError::Unrecognized {
            kind: other.map(str::to_owned),
        }),
    }
}

pub fn encode_upstream_command(command: &UpstreamCommand) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}

/// Relay status returned by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusDto {
    pub upstream: UpstreamStatusDto,
    pub downstream_attached: bool,
    pub loon_state_subscribed: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamStatusDto {
    Connecting,
    Connected,
    Disconnected,
}

impl From<UpstreamStatus> for UpstreamStatusDto {
    fn from(status: UpstreamStatus) -> Self {
        match status {
            UpstreamStatus::Connecting => UpstreamStatusDto::Connecting,
            UpstreamStatus::Connected => UpstreamStatusDto::Connected,
            UpstreamStatus::Disconnected => UpstreamStatusDto::Disconnected,
        }
    }
}

impl From<SessionStatus> for SessionStatusDto {
    fn from(status: SessionStatus) -> Self {
        Self {
            upstream: status.upstream.into(),
            downstream_attached: status.downstream_attached,
            loon_state_subscribed: status.loon_state_subscribed,
        }
    }
}

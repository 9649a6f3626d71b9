// Wire format between the turret client and the relay.
//
// Inbound frames are the upstream telemetry frames the relay forwards verbatim.
// Outbound frames are the relay's client commands.

use crate::domain::{BalloonPosition, BalloonPositionSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const EMPTY_MESSAGE_TEXT: &str = "No message data.";

/// Commands sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    StartGame,
    PopLoon(String),
}

pub fn encode_client_command(command: &ClientCommand) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}

/// One decoded telemetry frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    BalloonState(BalloonPositionSet),
    LogMessage(String),
    Unrecognized(Value),
}

#[derive(Debug)]
pub enum FrameError {
    InvalidJson(serde_json::Error),
    // A known topic whose payload has the wrong shape.
    Malformed { topic: &'static str, reason: String },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidJson(err) => write!(f, "invalid json: {err}"),
            FrameError::Malformed { topic, reason } => write!(f, "malformed {topic} frame: {reason}"),
        }
    }
}

impl std::error::Error for FrameError {}

#[derive(Debug, Deserialize)]
struct LoonPositionDto {
    position_x: f64,
    position_y: f64,
}

/// Decode a frame forwarded by the relay.
///
/// `msg` is checked before `loonState`, so a frame carrying both is a log message.
pub fn decode_inbound_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;

    let mut fields = match value {
        Value::Object(fields) => fields,
        other => return Ok(InboundFrame::Unrecognized(other)),
    };

    if let Some(msg) = fields.remove("msg") {
        return decode_log_message(msg).map(InboundFrame::LogMessage);
    }
    if let Some(state) = fields.remove("loonState") {
        return decode_loon_state(state).map(InboundFrame::BalloonState);
    }

    Ok(InboundFrame::Unrecognized(Value::Object(fields)))
}

// {"msg": {"msg": "<text>"}}; a missing or empty text gets a placeholder.
fn decode_log_message(msg: Value) -> Result<String, FrameError> {
    let text = match msg {
        Value::Object(inner) => match inner.get("msg") {
            Some(Value::String(text)) => text.clone(),
            None | Some(Value::Null) => String::new(),
            Some(other) => {
                return Err(FrameError::Malformed {
                    topic: "msg",
                    reason: format!("expected string text, got {other}"),
                });
            }
        },
        Value::Null => String::new(),
        other => {
            return Err(FrameError::Malformed {
                topic: "msg",
                reason: format!("expected object, got {other}"),
            });
        }
    };

    if text.is_empty() {
        Ok(EMPTY_MESSAGE_TEXT.to_string())
    } else {
        Ok(text)
    }
}

// {"loonState": {"<id>": {"position_x": .., "position_y": ..}, ..}} in key order.
fn decode_loon_state(state: Value) -> Result<BalloonPositionSet, FrameError> {
    let entries: Map<String, Value> = match state {
        Value::Object(entries) => entries,
        other => {
            return Err(FrameError::Malformed {
                topic: "loonState",
                reason: format!("expected object, got {other}"),
            });
        }
    };

    entries
        .into_iter()
        .map(|(id, position)| {
            serde_json::from_value::<LoonPositionDto>(position)
                .map(|dto| BalloonPosition::new(id.clone(), dto.position_x, dto.position_y))
                .map_err(|err| FrameError::Malformed {
                    topic: "loonState",
                    reason: format!("balloon {id:?}: {err}"),
                })
        })
        .collect()
}

use std::{env, fmt, time::Duration};
use url::Url;

// Client constants and environment-backed settings.

pub const RELAY_COMMAND_CAPACITY: usize = 64;
pub const POP_COMMAND_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum ConfigError {
    InvalidRelayUrl(url::ParseError),
    UnsupportedScheme(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidRelayUrl(err) => write!(f, "RELAY_WS_URL is invalid: {err}"),
            ConfigError::UnsupportedScheme(scheme) => {
                write!(f, "RELAY_WS_URL must use ws or wss, got {scheme:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn relay_ws_url() -> Result<Url, ConfigError> {
    let raw = env::var("RELAY_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8000".to_string());
    parse_relay_url(raw.trim())
}

pub fn parse_relay_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(ConfigError::InvalidRelayUrl)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

fn millis_var(name: &str, default_ms: u64) -> Duration {
    let millis = env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default_ms);
    Duration::from_millis(millis)
}

fn bool_var(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => parse_bool(&value).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// Pixels per telemetry unit.
pub fn canvas_scale() -> f64 {
    env::var("CANVAS_SCALE")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(4.0)
}

pub fn fire_interval() -> Duration {
    millis_var("FIRE_INTERVAL_MS", 1_000)
}

// Set but empty disables round-end detection.
pub fn round_end_sentinel() -> String {
    env::var("ROUND_END_SENTINEL").unwrap_or_else(|_| "No loons left".to_string())
}

pub fn end_game_on_round_end() -> bool {
    bool_var("END_GAME_ON_ROUND_END", false)
}

// Off means spectate only: nothing else starts the game.
pub fn auto_start() -> bool {
    bool_var("AUTO_START", true)
}

pub fn message_history_limit() -> usize {
    env::var("MESSAGE_HISTORY_LIMIT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(100)
}

pub fn turret_layout_path() -> Option<String> {
    env::var("TURRET_LAYOUT_PATH")
        .ok()
        .filter(|path| !path.trim().is_empty())
}

pub fn connect_timeout() -> Duration {
    millis_var("RELAY_CONNECT_TIMEOUT_MS", 10_000)
}

pub fn reconnect_min() -> Duration {
    millis_var("RELAY_RECONNECT_MIN_MS", 500)
}

pub fn reconnect_max() -> Duration {
    millis_var("RELAY_RECONNECT_MAX_MS", 30_000)
}

pub fn heartbeat_interval() -> Duration {
    millis_var("HEARTBEAT_INTERVAL_MS", 15_000)
}

pub fn idle_timeout() -> Duration {
    millis_var("IDLE_TIMEOUT_MS", 45_000)
}

use std::{
    env, fmt,
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};
use url::Url;

// Runtime/server constants and environment-backed settings.

pub const UPSTREAM_COMMAND_CAPACITY: usize = 64;
pub const DOWNSTREAM_FRAME_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum ConfigError {
    MissingUpstreamUrl,
    InvalidUpstreamUrl(url::ParseError),
    UnsupportedScheme(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingUpstreamUrl => f.write_str("UPSTREAM_WS_URL must be set"),
            ConfigError::InvalidUpstreamUrl(err) => write!(f, "UPSTREAM_WS_URL is invalid: {err}"),
            ConfigError::UnsupportedScheme(scheme) => {
                write!(f, "UPSTREAM_WS_URL must use ws or wss, got {scheme:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// All interfaces unless narrowed, e.g. RELAY_HOST=127.0.0.1.
pub fn http_host() -> IpAddr {
    env::var("RELAY_HOST")
        .ok()
        .and_then(|v| parse_host(&v))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn parse_host(raw: &str) -> Option<IpAddr> {
    raw.trim().parse().ok()
}

pub fn http_port() -> u16 {
    env::var("RELAY_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
}

// The upstream URL carries an access token, so there is no default.
pub fn upstream_ws_url() -> Result<Url, ConfigError> {
    let raw = env::var("UPSTREAM_WS_URL").map_err(|_| ConfigError::MissingUpstreamUrl)?;
    parse_upstream_url(raw.trim())
}

pub fn parse_upstream_url(raw: &str) -> Result<Url, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::MissingUpstreamUrl);
    }
    let url = Url::parse(raw).map_err(ConfigError::InvalidUpstreamUrl)?;
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

pub fn upstream_connect_timeout() -> Duration {
    millis_var("UPSTREAM_CONNECT_TIMEOUT_MS", 10_000)
}

pub fn upstream_reconnect_min() -> Duration {
    millis_var("UPSTREAM_RECONNECT_MIN_MS", 500)
}

pub fn upstream_reconnect_max() -> Duration {
    millis_var("UPSTREAM_RECONNECT_MAX_MS", 30_000)
}

pub fn heartbeat_interval() -> Duration {
    millis_var("HEARTBEAT_INTERVAL_MS", 15_000)
}

pub fn idle_timeout() -> Duration {
    millis_var("IDLE_TIMEOUT_MS", 45_000)
}

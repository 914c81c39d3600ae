use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub sse: SseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Stream behaviour, read from `SSE_*` variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    /// Keep-alive interval in milliseconds; 0 disables keep-alive
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Unset or 0 means connections never expire
    #[serde(default)]
    pub connection_max_lifetime_minutes: Option<u64>,
    #[serde(default)]
    pub max_notifications_per_connection: Option<u64>,
    /// Encoded frames of this many bytes or more are dropped
    #[serde(default)]
    pub max_notification_bytes: Option<usize>,
    #[serde(default = "default_connection_path")]
    pub connection_path: String,
    /// Frames buffered per client before writers are suspended
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_env() -> String {
    "development".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_ping_interval_ms() -> u64 {
    15_000
}

fn default_connection_path() -> String {
    "/sse/connection".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: default_env(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            connection_max_lifetime_minutes: None,
            max_notifications_per_connection: None,
            max_notification_bytes: None,
            connection_path: default_connection_path(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl SseConfig {
    /// `None` when keep-alive is disabled
    pub fn ping_interval(&self) -> Option<Duration> {
        match self.ping_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// `None` when connections may live forever
    ///
    /// A limit too large to represent in seconds is treated as unlimited.
    pub fn max_lifetime(&self) -> Option<Duration> {
        match self.connection_max_lifetime_minutes {
            None | Some(0) => None,
            Some(minutes) => minutes.checked_mul(60).map(Duration::from_secs),
        }
    }
}

impl Config {
    pub fn from_env() -> crate::error::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            app: envy::prefixed("APP_").from_env()?,
            sse: envy::prefixed("SSE_").from_env()?,
        })
    }
}

use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Base WebSocket URL (the `token` query parameter is appended)
    pub url: String,
    /// Time allowed for a single attempt to open, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Retries after a failed initial attempt
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Fixed delay between retries, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Polling interval used by `wait_for_connection`
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Default timeout used by `wait_for_connection_default`
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Channel subscribed to by the self-healing reconnect
    #[serde(default = "default_reconnect_channel")]
    pub reconnect_channel: String,
    /// Param that carries the connection id in the reconnect descriptor
    #[serde(default = "default_reconnect_id_param")]
    pub reconnect_id_param: String,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_wait_timeout_ms() -> u64 {
    5000
}

fn default_reconnect_channel() -> String {
    "ChatChannel".to_string()
}

fn default_reconnect_id_param() -> String {
    "chat_id".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Target OS identifier; `ios` sends the token unencoded
    #[serde(default = "default_os")]
    pub os: String,
}

fn default_os() -> String {
    env::consts::OS.to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Channel the `channel-tail` binary subscribes to
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_connection_id")]
    pub connection_id: u64,
    #[serde(default = "default_reconnect_channel")]
    pub channel: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn default_connection_id() -> u64 {
    1
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("websocket.url", "ws://localhost:3000/cable")?
            .set_default("websocket.connect_timeout_ms", 5000)?
            .set_default("websocket.max_retry_attempts", 3)?
            .set_default("websocket.retry_delay_ms", 1000)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // CHANNEL__WEBSOCKET__URL, CHANNEL__AUTH__TOKEN, CHANNEL__SESSION__CONNECTION_ID, ...
            .add_source(
                Environment::with_prefix("CHANNEL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl WebSocketConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/cable".to_string(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            wait_timeout_ms: default_wait_timeout_ms(),
            reconnect_channel: default_reconnect_channel(),
            reconnect_id_param: default_reconnect_id_param(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self { os: default_os() }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_id: default_connection_id(),
            channel: default_reconnect_channel(),
            params: Map::new(),
        }
    }
}

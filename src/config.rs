use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the document REST API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// STOMP WebSocket endpoint. Derived from `api_base` when unset.
    pub ws_url: Option<String>,

    /// Fixed delay between reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Outgoing heart-beat interval, 0 disables
    #[serde(default = "default_heartbeat_outgoing_ms")]
    pub heartbeat_outgoing_ms: u64,

    /// Incoming heart-beat interval requested from the broker, 0 disables
    #[serde(default)]
    pub heartbeat_incoming_ms: u64,

    /// Fetch the document again every time the channel (re)connects
    #[serde(default = "default_reseed_on_connect")]
    pub reseed_on_connect: bool,

    /// Where the session (token, recent documents) is persisted
    pub session_file: Option<String>,

    /// Level for this crate's logs when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from `INLYNE_*` environment variables or an app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        Ok(envy::prefixed("INLYNE_").from_env::<Config>()?)
    }

    /// The WebSocket endpoint of the STOMP broker.
    ///
    /// `https://host` becomes `wss://host/ws/websocket`, the raw-socket path
    /// next to the broker's SockJS endpoint.
    pub fn websocket_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let base = self.api_base.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws/websocket", ws_base)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_outgoing(&self) -> Duration {
        Duration::from_millis(self.heartbeat_outgoing_ms)
    }

    pub fn heartbeat_incoming(&self) -> Duration {
        Duration::from_millis(self.heartbeat_incoming_ms)
    }

    /// Session file location, falling back to the platform config directory
    pub fn session_path(&self) -> PathBuf {
        match &self.session_file {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("inlyne")
                .join("session.json"),
        }
    }

    /// Fallback log directives: `log_level` for the client, `warn` for dependencies
    pub fn log_filter(&self) -> String {
        format!("inlyne_client={0},inlyne={0},warn", self.log_level)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            ws_url: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_outgoing_ms: default_heartbeat_outgoing_ms(),
            heartbeat_incoming_ms: 0,
            reseed_on_connect: default_reseed_on_connect(),
            session_file: None,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_api_base() -> String {
    "https://api.inlyne.link".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_heartbeat_outgoing_ms() -> u64 {
    20_000
}

fn default_reseed_on_connect() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

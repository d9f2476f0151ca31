use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Command-line flags. Only flags that were actually given are serialized,
/// so unset flags never mask values from the TOML file or the environment.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "presence-server", version, about = "Realtime presence and messaging server")]
pub struct Cli {
    /// Port to listen on [default: 3000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./presence.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Data directory for the message and directory database [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

/// Effective server configuration after all layers are merged.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub data_dir: String,

    /// Realtime behaviour (loaded from [realtime] section in TOML)
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Knobs for the realtime layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Tell peers when a user's last endpoint disconnects (default: true)
    #[serde(default = "default_true")]
    pub announce_offline: bool,

    /// Reject direct messages whose content is empty or whitespace (default: true)
    #[serde(default = "default_true")]
    pub reject_empty_messages: bool,

    /// Seconds between server pings on each WebSocket (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl RealtimeConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs.max(1))
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            announce_offline: true,
            reject_empty_messages: true,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PRESENCE_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("PRESENCE_").split("__"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Presence Server Configuration
# Place this file at ./presence.toml or specify with --config <path>
# All settings can be overridden via environment variables (PRESENCE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging
# json_logs = false

# Data directory for the SQLite message/directory database
# data_dir = "./data"

# ---- Realtime ----
# [realtime]

# Broadcast "user disconnected" when a user's last connection closes
# announce_offline = true

# Refuse direct messages with empty content
# reject_empty_messages = true

# WebSocket keepalive
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}

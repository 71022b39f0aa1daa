//! Daemon configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) yields a working log-only gateway on `localhost:1315`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use sensorsync_engine::{EngineConfig, TimeFormat};
use serde::{Deserialize, Serialize};

/// Complete daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Owner id attached to every sensor stream
    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Stream link to the radio gateway
    #[serde(default)]
    pub link: LinkConfig,

    /// Remote registry; absent means log-only mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryConfig>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,
}

fn default_user_id() -> String {
    "user".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            log_format: LogFormat::default(),
            link: LinkConfig::default(),
            registry: None,
            store: StoreConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Settings for the synchronization engine
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            user_id: self.user_id.clone(),
            time_format: self.protocol.time_format,
            unit_payload: self.protocol.unit_payload.clone(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Radio gateway link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_link_host")]
    pub host: String,

    #[serde(default = "default_link_port")]
    pub port: u16,

    /// Wait before reconnecting after the link drops
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Ask the radio gateway for its version after connecting
    #[serde(default = "default_true")]
    pub version_request: bool,
}

fn default_link_host() -> String {
    "localhost".to_string()
}

fn default_link_port() -> u16 {
    1315
}

fn default_reconnect_delay() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: default_link_host(),
            port: default_link_port(),
            reconnect_delay_ms: default_reconnect_delay(),
            version_request: true,
        }
    }
}

impl LinkConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Remote registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL, e.g. "http://mysensors:4711"
    pub base_url: String,

    /// Overall bound on a registry call in milliseconds
    #[serde(default = "default_registry_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_registry_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_registry_timeout() -> u64 {
    5000
}

fn default_registry_connect_timeout() -> u64 {
    2000
}

impl RegistryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_registry_timeout(),
            connect_timeout_ms: default_registry_connect_timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Local store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON state file; in-memory store when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Node protocol replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub time_format: TimeFormat,

    /// Payload of the reply to a unit request
    #[serde(default = "default_unit_payload")]
    pub unit_payload: String,
}

fn default_unit_payload() -> String {
    "0".to_string()
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::default(),
            unit_payload: default_unit_payload(),
        }
    }
}

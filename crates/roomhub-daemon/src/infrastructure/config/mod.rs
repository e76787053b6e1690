//! TOML configuration loading for the hub daemon.
//!
//! Four files make up a deployment, all living in one config directory:
//! - `hub.toml`        daemon identity and integration endpoints
//! - `hid_keymap.toml` HID usage names for keyboard and consumer pages
//! - `activities.toml` per-activity button-to-action mappings
//! - `remote.toml`     input device node and raw-event-to-button mapping
//!
//! `hub.toml` is read once at startup; the other three are watched and
//! hot-reloaded by [`reload::Reloader`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use roomhub_core::{ActivityTable, KeymapError, Keymaps};

pub mod reload;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A keymap entry failed validation.
    #[error("invalid keymap in {path}: {source}")]
    Keymap {
        path: PathBuf,
        #[source]
        source: KeymapError,
    },

    /// A required field was absent or empty.
    #[error("{path}: required field `{field}` is missing or empty")]
    MissingField { path: PathBuf, field: &'static str },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration (`hub.toml`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HubConfig {
    /// Room identifier prefixed onto published service-call topics.
    /// Required; the daemon refuses to start without it.
    pub room: Option<String>,
    /// Advertised BLE HID device name.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// systemd unit restarted by the `sys:restart` text command.
    #[serde(default = "default_service_unit")]
    pub service_unit: String,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub ble: BleConfig,
}

/// Smart-home broker endpoint settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

/// BLE HID transport settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BleConfig {
    /// Whether to advertise and serve HID reports at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Input device settings (`remote.toml`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteConfig {
    pub device: DeviceConfig,
    /// Raw identifier (decimal key code, or hex/decimal scan code) to logical
    /// button name.
    #[serde(default)]
    pub mapping: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Device node, e.g. `/dev/input/event3`.
    pub path: PathBuf,
    /// Grab the device for exclusive access.
    #[serde(default = "default_true")]
    pub grab: bool,
}

/// On-disk shape of `hid_keymap.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
struct KeymapFile {
    #[serde(default)]
    keyboard: HashMap<String, u32>,
    #[serde(default)]
    consumer: HashMap<String, u32>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_name() -> String {
    "roomhub".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_service_unit() -> String {
    "roomhubd.service".to_string()
}
fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}
fn default_broker_port() -> u16 {
    1883
}
fn default_true() -> bool {
    true
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
        }
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl HubConfig {
    /// Returns the validated room name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when `room` is absent or blank.
    pub fn room(&self, path: &Path) -> Result<&str, ConfigError> {
        match self.room.as_deref().map(str::trim) {
            Some(room) if !room.is_empty() => Ok(room),
            _ => Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                field: "room",
            }),
        }
    }
}

// ── Loaders ───────────────────────────────────────────────────────────────────

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads and validates `hub.toml`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] on read/parse
/// failure, and [`ConfigError::MissingField`] when `room` is not set.
pub fn load_hub_config(path: &Path) -> Result<HubConfig, ConfigError> {
    let cfg: HubConfig = read_toml(path)?;
    cfg.room(path)?;
    Ok(cfg)
}

/// Loads `hid_keymap.toml` into validated [`Keymaps`].
///
/// # Errors
///
/// Returns [`ConfigError::Keymap`] when any usage value is out of range for
/// its page.
pub fn load_keymaps(path: &Path) -> Result<Keymaps, ConfigError> {
    let file: KeymapFile = read_toml(path)?;
    Keymaps::from_tables(file.keyboard, file.consumer).map_err(|source| ConfigError::Keymap {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `activities.toml`.
pub fn load_activities(path: &Path) -> Result<ActivityTable, ConfigError> {
    read_toml(path)
}

/// Loads `remote.toml`.
pub fn load_remote_config(path: &Path) -> Result<RemoteConfig, ConfigError> {
    read_toml(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

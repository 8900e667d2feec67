//! TOML-based configuration for the RadioLink host.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Linux:    `$XDG_CONFIG_HOME/radiolink/config.toml` (or `~/.config/radiolink/`)
//! - Windows:  `%APPDATA%\RadioLink\config.toml`
//! - macOS:    `~/Library/Application Support/RadioLink/config.toml`
//!
//! or from an explicit path passed with `--config`.
//!
//! Example:
//!
//! ```toml
//! [general]
//! log_level = "debug"
//!
//! [link]
//! service_uuid = "00001812-0000-1000-8000-00805f9b34fb"
//! connect_timeout_ms = 5000
//!
//! [scan]
//! window_secs = 12
//! advertise_interval_ms = 200
//!
//! [simulated]
//! adapter = "enabled"
//!
//! [[simulated.peers]]
//! address = "00:1A:7D:DA:71:13"
//! name = "CF Shutter"
//! connect_delay_ms = 300
//! ```
//!
//! # Serde default values
//!
//! Every section and field has a default, so a missing file, a missing
//! section, or a file written by an older version all load cleanly.

use std::path::{Path, PathBuf};

use radiolink_core::{PeerAddress, ServiceId, HID_SERVICE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub link: LinkConfig,
    pub scan: ScanConfig,
    pub simulated: SimulatedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is not set, e.g. `"info"` or
    /// `"radiolink_host=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Link settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    /// Service every link connects to.
    #[serde(default = "default_service_uuid")]
    pub service_uuid: ServiceId,
    /// Longest a connect attempt may block before it counts as failed.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Scan timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// How long one scan runs before the radio reports it finished.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Gap between two sightings reported by the simulated radio.
    #[serde(default = "default_advertise_interval_ms")]
    pub advertise_interval_ms: u64,
}

/// Adapter state of the simulated radio.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdapterSetting {
    #[default]
    Enabled,
    Disabled,
    Absent,
}

/// The simulated radio used by the command-line host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedConfig {
    #[serde(default)]
    pub adapter: AdapterSetting,
    #[serde(default = "default_simulated_peers")]
    pub peers: Vec<SimulatedPeerEntry>,
}

/// One peer of the simulated radio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedPeerEntry {
    pub address: PeerAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub reachable: bool,
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
    #[serde(default = "default_repeat_sightings")]
    pub repeat_sightings: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_service_uuid() -> ServiceId {
    HID_SERVICE
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_window_secs() -> u64 {
    12
}
fn default_advertise_interval_ms() -> u64 {
    200
}
fn default_true() -> bool {
    true
}
fn default_connect_delay_ms() -> u64 {
    300
}
fn default_repeat_sightings() -> u32 {
    2
}

/// Two demo peers: a named remote shutter that accepts connections and an
/// unnamed device that refuses them.
fn default_simulated_peers() -> Vec<SimulatedPeerEntry> {
    let demo = [
        ("00:1A:7D:DA:71:13", Some("CF Shutter"), true),
        ("5C:F3:70:00:00:01", None, false),
    ];
    demo.into_iter()
        .filter_map(|(address, name, reachable)| {
            Some(SimulatedPeerEntry {
                address: PeerAddress::new(address).ok()?,
                name: name.map(str::to_string),
                reachable,
                connect_delay_ms: default_connect_delay_ms(),
                repeat_sightings: default_repeat_sightings(),
            })
        })
        .collect()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            advertise_interval_ms: default_advertise_interval_ms(),
        }
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterSetting::default(),
            peers: default_simulated_peers(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the default location, returning defaults if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses TOML text into an `AppConfig`.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Resolves the platform config base directory plus the `radiolink` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RadioLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("radiolink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RadioLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

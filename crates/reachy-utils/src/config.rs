//! Configuration loading
//!
//! Two sources: the robot identity file written at assembly time
//! (`~/.reachy.yaml`, required), and the optional tool settings (TOML) that
//! fall back to defaults when absent.

use reachy_core::{RobotModel, ARM_SCAN_WINDOW};
use reachy_discovery::{DiscoveryConfig, ProbeSettings, DEFAULT_BUS_PREFIX};
use reachy_udev::DEFAULT_RULES_PATH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::service::DEFAULT_SERVICE;

pub const ROBOT_CONFIG_FILE: &str = ".reachy.yaml";
pub const SETTINGS_FILE: &str = "reachy-utils.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Robot configuration {path} unavailable: {reason}")]
    Unavailable { path: PathBuf, reason: String },
    #[error("Failed to read settings {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Robot identity, as written in `~/.reachy.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    pub model: RobotModel,
    #[serde(default)]
    pub generation: Option<u32>,
    #[serde(default)]
    pub zuuu_model: Option<serde_yaml::Value>,
    #[serde(default)]
    pub camera_parameters: Option<serde_yaml::Value>,
    #[serde(default)]
    pub serial_number: Option<serde_yaml::Value>,
}

pub fn default_robot_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(ROBOT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(ROBOT_CONFIG_FILE))
}

/// Load the robot identity; any failure leaves the model unknown
pub fn load_robot_config(path: &Path) -> Result<RobotConfig, ConfigError> {
    let unavailable = |reason: String| ConfigError::Unavailable {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
    let config: RobotConfig =
        serde_yaml::from_str(&content).map_err(|e| unavailable(e.to_string()))?;
    info!(
        path = %path.display(),
        model = %config.model,
        generation = ?config.generation,
        serial_number = ?config.serial_number,
        zuuu_model = ?config.zuuu_model,
        cameras_configured = config.camera_parameters.is_some(),
        "Loaded robot configuration"
    );
    Ok(config)
}

/// Tool settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub udev: UdevSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Device path prefix of the per-part buses
    #[serde(default = "default_bus_prefix")]
    pub bus_prefix: String,
    /// Background service holding the buses open
    #[serde(default = "default_service")]
    pub service: String,
    /// Arm buses are pinged for every identifier below this bound
    #[serde(default = "default_arm_scan_window")]
    pub arm_scan_window: u8,
    #[serde(default)]
    pub probe: ProbeSettings,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            bus_prefix: default_bus_prefix(),
            service: default_service(),
            arm_scan_window: default_arm_scan_window(),
            probe: ProbeSettings::default(),
        }
    }
}

fn default_bus_prefix() -> String {
    DEFAULT_BUS_PREFIX.to_string()
}

fn default_arm_scan_window() -> u8 {
    ARM_SCAN_WINDOW
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdevSettings {
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,
}

impl Default for UdevSettings {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
        }
    }
}

fn default_rules_path() -> PathBuf {
    PathBuf::from(DEFAULT_RULES_PATH)
}

impl Settings {
    /// Discovery parameters for `model`
    pub fn discovery_config(&self, model: RobotModel) -> DiscoveryConfig {
        DiscoveryConfig {
            model,
            bus_prefix: self.discovery.bus_prefix.clone(),
            arm_scan_window: self.discovery.arm_scan_window,
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(SETTINGS_FILE))
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE))
}

/// Load settings from file, or defaults when it does not exist
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&content).map_err(|source| ConfigError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    } else {
        info!(path = %path.display(), "Settings file not found, using defaults");
        Ok(Settings::default())
    }
}

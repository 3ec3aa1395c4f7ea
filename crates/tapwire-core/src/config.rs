//! Project configuration for test runs.
//!
//! Settings are read from a JSON file (`~/.tapwire/tapwire.json` by default,
//! or any explicit path) and cover everything a run needs: the target
//! platform, capability inputs, device-farm coordinates, the local
//! driver-server endpoint, and interaction timeouts. Missing sections fall
//! back to built-in defaults so a minimal config file only states what it
//! overrides.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILENAME: &str = "tapwire.json";

/// Returns the tapwire data directory (`~/.tapwire`).
pub fn tapwire_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tapwire")
}

/// Target mobile platform for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Android device or emulator.
    #[default]
    Android,
    /// iOS device or simulator.
    Ios,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => write!(f, "Android"),
            Platform::Ios => write!(f, "iOS"),
        }
    }
}

/// Capability inputs supplied by the project (as opposed to framework
/// defaults or farm-allocated values).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Device name the driver should target.
    pub device_name: Option<String>,
    /// OS version of the target device.
    pub platform_version: Option<String>,
    /// Automation engine override; the platform default is used when unset.
    pub automation_name: Option<String>,
    /// Keep app state between sessions instead of resetting.
    pub no_reset: Option<bool>,
    /// Reinstall the app from scratch on session start.
    pub full_reset: Option<bool>,
    /// Android application package.
    pub app_package: Option<String>,
    /// Android activity launched on session start.
    pub app_activity: Option<String>,
    /// iOS bundle identifier.
    pub bundle_id: Option<String>,
    /// iOS device UDID.
    pub udid: Option<String>,
    /// Path to the Android app binary to install, if any.
    pub android_app: Option<PathBuf>,
    /// Path to the iOS app binary to install, if any.
    pub ios_app: Option<PathBuf>,
}

/// Remote device-farm coordinates and allocation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmConfig {
    /// Whether farm allocation is enabled for this project.
    pub active: bool,
    /// Base URL of the farm inventory API.
    pub base_url: String,
    /// Bearer token for the farm API.
    pub token: String,
    /// Pin allocation to this serial instead of scanning the inventory.
    pub device_serial: Option<String>,
    /// Re-check the reservation when a session is re-entered, surfacing an
    /// expired lease early instead of failing later inside the driver.
    pub revalidate_reservation: bool,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            active: false,
            base_url: "http://localhost:7100/api/v1".to_string(),
            token: String::new(),
            device_serial: None,
            revalidate_reservation: false,
        }
    }
}

/// Local driver-server endpoint and process management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverServerConfig {
    /// Host the server listens on.
    pub host: String,
    /// Port the server listens on.
    pub port: u16,
    /// Full URL sessions connect to.
    pub url: String,
    /// Forward the server's console output instead of discarding it.
    pub console_log: bool,
    /// Spawn the server process when a session is created.
    pub autostart: bool,
}

impl Default for DriverServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4723,
            url: "http://127.0.0.1:4723".to_string(),
            console_log: false,
            autostart: false,
        }
    }
}

/// Interaction-engine timing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Default wait window for visibility checks, in seconds.
    pub wait_timeout_secs: u64,
    /// Default number of scroll gestures when searching for an element.
    pub scroll_attempts: u32,
    /// Driver-side idle timeout before the session is considered abandoned,
    /// in seconds.
    pub new_command_timeout_secs: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 20,
            scroll_attempts: 10,
            new_command_timeout_secs: 300,
        }
    }
}

/// Full project configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Target platform for the session.
    pub platform: Platform,
    /// Project capability inputs.
    pub capabilities: CapabilityConfig,
    /// Device-farm settings.
    pub farm: FarmConfig,
    /// Local driver-server settings.
    pub driver_server: DriverServerConfig,
    /// Interaction-engine timing.
    pub interaction: InteractionConfig,
}

impl Config {
    /// Load config from the given path.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Load config from the default location (`~/.tapwire/tapwire.json`).
    pub fn load_default() -> Self {
        Self::load(&tapwire_dir().join(CONFIG_FILENAME))
    }

    /// Save config to the given path.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

/// Returns true when running under a CI environment.
///
/// CI runs always go through the device farm, matching the behavior of a
/// dedicated build agent that has no locally attached device.
pub fn is_ci_environment() -> bool {
    std::env::var("CI").map(|v| !v.is_empty()).unwrap_or(false)
}

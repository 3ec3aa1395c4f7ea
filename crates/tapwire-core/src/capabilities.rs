//! Driver capability construction.
//!
//! A session's capability set is assembled once, from three layered sources:
//! framework defaults, the project configuration, and (when a farm device
//! has been allocated) the device snapshot itself. The build order is fixed
//! and later layers win:
//!
//! 1. internal defaults (platform name, automation engine, reset policy,
//!    command timeout)
//! 2. platform dispatch (Android package/activity/keyboard/permission flags;
//!    iOS UDID/bundle id/alert auto-accept)
//! 3. app-install augmentation (a configured app binary forces installation
//!    and clears the no-reset flag)
//! 4. farm override (Android only: identity fields of the allocated device
//!    replace whatever the earlier layers supplied)

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, Platform};
use crate::farm::AllocatedDevice;

/// Install wait budget for the driver's on-device server, in milliseconds.
const SERVER_INSTALL_TIMEOUT_MS: u64 = 60_000;

/// Errors that can occur while resolving capabilities.
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// The configured app binary does not exist on disk.
    #[error("app binary for {platform} not found at '{path}'; check the configured app path")]
    AppNotFound {
        /// Platform whose app path was configured.
        platform: Platform,
        /// The missing path.
        path: PathBuf,
    },
}

/// Flat key/value capability set sent to the driver on session creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Capabilities {
    values: BTreeMap<String, Value>,
}

impl Capabilities {
    /// Sets a capability, replacing any earlier value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Looks up a capability value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Looks up a capability as a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Looks up a capability as a boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    /// Iterates over all capabilities in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of capabilities set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when no capability is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds the capability set for a session. Pure construction, no state.
pub struct CapabilityResolver;

impl CapabilityResolver {
    /// Resolves the full capability set for the configured platform,
    /// folding in the allocated farm device when one is present.
    ///
    /// # Errors
    ///
    /// [`CapabilityError::AppNotFound`] if an app binary path is configured
    /// but absent on disk.
    pub fn resolve(
        config: &Config,
        farm_device: Option<&AllocatedDevice>,
    ) -> Result<Capabilities, CapabilityError> {
        let mut caps = Self::internal_defaults(config);
        Self::apply_platform(&mut caps, config);
        Self::apply_app_install(&mut caps, config)?;
        if config.platform == Platform::Android {
            if let Some(allocation) = farm_device {
                Self::apply_farm_device(&mut caps, allocation);
            }
        }
        Ok(caps)
    }

    fn internal_defaults(config: &Config) -> Capabilities {
        let mut caps = Capabilities::default();
        caps.set("platformName", config.platform.to_string());
        caps.set(
            "automationName",
            match config.platform {
                Platform::Android => "UiAutomator2",
                Platform::Ios => "XCUITest",
            },
        );
        caps.set(
            "newCommandTimeout",
            config.interaction.new_command_timeout_secs,
        );
        caps.set("fullReset", false);
        caps.set("noReset", true);

        if let Some(device_name) = &config.capabilities.device_name {
            caps.set("deviceName", device_name.as_str());
        }
        if let Some(version) = &config.capabilities.platform_version {
            caps.set("platformVersion", version.as_str());
        }
        if let Some(automation) = &config.capabilities.automation_name {
            caps.set("automationName", automation.as_str());
        }
        if let Some(no_reset) = config.capabilities.no_reset {
            caps.set("noReset", no_reset);
        }
        if let Some(full_reset) = config.capabilities.full_reset {
            caps.set("fullReset", full_reset);
        }
        caps
    }

    fn apply_platform(caps: &mut Capabilities, config: &Config) {
        match config.platform {
            Platform::Android => {
                if let Some(package) = &config.capabilities.app_package {
                    caps.set("appPackage", package.as_str());
                }
                if let Some(activity) = &config.capabilities.app_activity {
                    caps.set("appActivity", activity.as_str());
                }
                caps.set("unicodeKeyboard", true);
                caps.set("resetKeyboard", true);
                caps.set("autoGrantPermissions", true);
                caps.set("serverInstallTimeout", SERVER_INSTALL_TIMEOUT_MS);
            }
            Platform::Ios => {
                if let Some(udid) = &config.capabilities.udid {
                    caps.set("udid", udid.as_str());
                }
                if let Some(bundle_id) = &config.capabilities.bundle_id {
                    caps.set("bundleId", bundle_id.as_str());
                }
                caps.set("autoAcceptAlerts", true);
            }
        }
    }

    fn apply_app_install(caps: &mut Capabilities, config: &Config) -> Result<(), CapabilityError> {
        let app_path = match config.platform {
            Platform::Android => &config.capabilities.android_app,
            Platform::Ios => &config.capabilities.ios_app,
        };
        let Some(path) = app_path else {
            return Ok(());
        };
        if !path.exists() {
            return Err(CapabilityError::AppNotFound {
                platform: config.platform,
                path: path.clone(),
            });
        }
        caps.set("app", path.to_string_lossy().into_owned());
        caps.set("enforceAppInstall", true);
        // installing a build implies starting from a clean app state
        caps.set("noReset", false);
        info!(path = %path.display(), "app binary will be installed on the device");
        Ok(())
    }

    fn apply_farm_device(caps: &mut Capabilities, allocation: &AllocatedDevice) {
        let device = &allocation.device;
        caps.set("platformName", device.platform.as_str());
        caps.set(
            "deviceName",
            allocation
                .remote_connect_url
                .as_deref()
                .unwrap_or(device.serial.as_str()),
        );
        caps.set("platformVersion", device.platform_version.as_str());
    }
}

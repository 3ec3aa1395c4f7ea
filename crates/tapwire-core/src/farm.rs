//! Client for the remote device-farm inventory and reservation API.
//!
//! The farm leases physical devices to test clients over HTTP. Allocation is
//! optimistic: the API offers no lock step beyond "reserve, then open a
//! remote connection", so a client selects an available device from a
//! snapshot, reserves it, asks for a remote-connect URL, and attaches the
//! local [`AdbBridge`](crate::adb::AdbBridge) to that URL. Release is
//! best-effort by design: a flaky teardown must never mask the test outcome.
//!
//! All endpoints answer a JSON envelope with a boolean `success` field;
//! a non-200 status or `success=false` counts as a farm failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::adb::{AdbBridge, AdbError};
use crate::config::FarmConfig;

/// Reservation lease requested from the farm, in milliseconds.
const RESERVATION_TIMEOUT_MS: u64 = 900_000;

/// Errors that can occur during farm allocation.
#[derive(Error, Debug)]
pub enum FarmError {
    /// The inventory API could not be queried.
    #[error("device farm unavailable: {0}")]
    Unavailable(String),

    /// The requested serial does not exist in the farm.
    #[error("device with serial '{0}' not found in the farm")]
    DeviceNotFound(String),

    /// The pinned device exists but is not available for use.
    #[error("device with serial '{0}' is not available")]
    DeviceNotAvailable(String),

    /// No device in the inventory qualifies for allocation.
    #[error("no device available in the device farm")]
    NoDeviceAvailable,

    /// The farm refused to open a remote connection to the device.
    #[error("could not open a remote connection to device '{0}': {1}")]
    RemoteConnectFailed(String, String),

    /// The local adb attach to the remoted device failed.
    #[error("adb connection to device '{serial}' failed")]
    AdbConnect {
        /// Serial of the device being attached.
        serial: String,
        /// The underlying adb failure.
        #[source]
        source: AdbError,
    },

    /// A previously held reservation is no longer ours.
    #[error("reservation for device '{0}' is no longer held")]
    ReservationLost(String),

    /// No device has been allocated by this client.
    #[error("no device allocated")]
    NotAllocated,

    /// An HTTP transport failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The farm answered with a body this client cannot interpret.
    #[error("malformed farm response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Identity snapshot of a farm device.
///
/// Constructed from an inventory response and immutable once read; fetch a
/// fresh snapshot to re-evaluate availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Platform reported by the farm (e.g. "Android").
    pub platform: String,
    /// OS version of the device.
    #[serde(rename = "version")]
    pub platform_version: String,
    /// Device serial, the farm-wide identifier.
    pub serial: String,
    /// Physically connected to its provider host.
    #[serde(default)]
    pub present: bool,
    /// Fully provisioned and ready for clients.
    #[serde(default)]
    pub ready: bool,
    /// Currently held by some client.
    #[serde(default, rename = "using")]
    pub in_use: bool,
    /// Identifier of the current holder, empty when unowned.
    #[serde(default)]
    pub owner: Option<String>,
}

impl Device {
    /// A device can be allocated iff it is present, ready, not in use, and
    /// has no owner recorded.
    pub fn is_available(&self) -> bool {
        self.present
            && self.ready
            && !self.in_use
            && self.owner.as_deref().map_or(true, str::is_empty)
    }
}

/// A device held by this client, with the remote-connect URL if the farm
/// granted one.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedDevice {
    /// The inventory snapshot the allocation was made from.
    pub device: Device,
    /// URL the local adb attaches to; `None` when the reservation call was
    /// refused and the client proceeded without one.
    pub remote_connect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceListEnvelope {
    success: bool,
    #[serde(default)]
    devices: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DeviceEnvelope {
    success: bool,
    device: Device,
}

#[derive(Debug, Deserialize)]
struct RemoteConnectEnvelope {
    success: bool,
    #[serde(rename = "remoteConnectUrl")]
    remote_connect_url: String,
}

#[derive(Debug, Serialize)]
struct ReserveRequest<'a> {
    serial: &'a str,
    timeout: u64,
}

/// Parses an inventory response body into devices.
///
/// Entries without a `platform` field are provider records that cannot be
/// allocated and are skipped. Exposed for testing.
pub fn parse_device_list(body: &[u8]) -> Result<Vec<Device>, FarmError> {
    let envelope: DeviceListEnvelope = serde_json::from_slice(body)?;
    if !envelope.success {
        return Err(FarmError::Unavailable(
            "inventory response reported success=false".to_string(),
        ));
    }
    let mut devices = Vec::new();
    for value in envelope.devices {
        if value.get("platform").is_some() {
            devices.push(serde_json::from_value(value)?);
        }
    }
    Ok(devices)
}

/// Returns the first available device in inventory order.
pub fn first_available(devices: &[Device]) -> Option<&Device> {
    devices.iter().find(|d| d.is_available())
}

/// HTTP client for the device farm, owning the allocation state for at most
/// one device at a time.
pub struct DeviceFarmClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    fixed_serial: Option<String>,
    allocated: Option<AllocatedDevice>,
}

impl DeviceFarmClient {
    /// Creates a client from the farm section of the project config.
    pub fn new(config: &FarmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            fixed_serial: config.device_serial.clone(),
            allocated: None,
        }
    }

    /// The device currently held by this client, if any.
    pub fn allocated(&self) -> Option<&AllocatedDevice> {
        self.allocated.as_ref()
    }

    /// Adopts a device reserved outside this client (e.g. by an external
    /// coordinator), so that release goes through the normal teardown path.
    pub fn adopt_allocation(&mut self, device: Device, remote_connect_url: Option<String>) {
        self.allocated = Some(AllocatedDevice {
            device,
            remote_connect_url,
        });
    }

    /// Takes the allocation out of the client without touching the farm.
    pub fn take_allocation(&mut self) -> Option<AllocatedDevice> {
        self.allocated.take()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Lists all allocatable devices known to the farm.
    ///
    /// # Errors
    ///
    /// [`FarmError::Unavailable`] if the request fails, the status is not
    /// 200, or the envelope reports `success=false`.
    pub async fn list_devices(&self) -> Result<Vec<Device>, FarmError> {
        let response = self
            .http
            .get(self.url("/devices"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FarmError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FarmError::Unavailable(format!(
                "GET /devices returned {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FarmError::Unavailable(e.to_string()))?;
        parse_device_list(&body)
    }

    /// Fetches a single device snapshot by serial.
    ///
    /// # Errors
    ///
    /// - [`FarmError::DeviceNotFound`] on HTTP 404
    /// - [`FarmError::Unavailable`] on any other failure
    pub async fn get_device(&self, serial: &str) -> Result<Device, FarmError> {
        let response = self
            .http
            .get(self.url(&format!("/devices/{serial}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FarmError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FarmError::DeviceNotFound(serial.to_string()));
        }
        if !response.status().is_success() {
            return Err(FarmError::Unavailable(format!(
                "GET /devices/{serial} returned {}",
                response.status()
            )));
        }

        let envelope: DeviceEnvelope = response
            .json()
            .await
            .map_err(|e| FarmError::Unavailable(e.to_string()))?;
        if !envelope.success {
            return Err(FarmError::Unavailable(
                "device response reported success=false".to_string(),
            ));
        }
        Ok(envelope.device)
    }

    /// Selects a device to allocate.
    ///
    /// With a pinned serial the snapshot is fetched and validated; otherwise
    /// the inventory is scanned in returned order and the first available
    /// device wins.
    pub async fn select_available_device(&self) -> Result<Device, FarmError> {
        match &self.fixed_serial {
            Some(serial) => {
                let device = self.get_device(serial).await?;
                if device.is_available() {
                    Ok(device)
                } else {
                    Err(FarmError::DeviceNotAvailable(serial.clone()))
                }
            }
            None => {
                let devices = self.list_devices().await?;
                first_available(&devices)
                    .cloned()
                    .ok_or(FarmError::NoDeviceAvailable)
            }
        }
    }

    /// Reserves a device for this client with a fixed lease.
    ///
    /// Reservation failure is non-fatal: the caller proceeds without a
    /// remote-connect URL rather than aborting, so any failure maps to
    /// `false`.
    pub async fn reserve(&self, device: &Device) -> bool {
        let payload = ReserveRequest {
            serial: &device.serial,
            timeout: RESERVATION_TIMEOUT_MS,
        };
        let result = self
            .http
            .post(self.url("/user/devices"))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await;

        let reserved = match result {
            Ok(response) if response.status().is_success() => response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("success").and_then(serde_json::Value::as_bool))
                .unwrap_or(false),
            Ok(response) => {
                warn!(serial = %device.serial, status = %response.status(), "reservation refused");
                false
            }
            Err(e) => {
                warn!(serial = %device.serial, error = %e, "reservation request failed");
                false
            }
        };
        if reserved {
            info!(serial = %device.serial, lease_ms = RESERVATION_TIMEOUT_MS, "device reserved");
        }
        reserved
    }

    /// Asks the farm for a remote-connect URL for a reserved device.
    ///
    /// # Errors
    ///
    /// [`FarmError::RemoteConnectFailed`] on any failure.
    pub async fn remote_connect(&self, serial: &str) -> Result<String, FarmError> {
        let response = self
            .http
            .post(self.url(&format!("/user/devices/{serial}/remoteConnect")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FarmError::RemoteConnectFailed(serial.to_string(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(FarmError::RemoteConnectFailed(
                serial.to_string(),
                format!("status {}", response.status()),
            ));
        }
        let envelope: RemoteConnectEnvelope = response
            .json()
            .await
            .map_err(|e| FarmError::RemoteConnectFailed(serial.to_string(), e.to_string()))?;
        if !envelope.success {
            return Err(FarmError::RemoteConnectFailed(
                serial.to_string(),
                "response reported success=false".to_string(),
            ));
        }
        Ok(envelope.remote_connect_url)
    }

    /// Runs the full allocation transaction: select, reserve, open a remote
    /// connection, attach the local adb.
    ///
    /// A refused reservation is tolerated: the client proceeds without a
    /// remote-connect URL and skips the adb attach, since there is nothing
    /// to attach to.
    ///
    /// # Errors
    ///
    /// - selection errors from [`select_available_device`](Self::select_available_device)
    /// - [`FarmError::RemoteConnectFailed`] if the reserved device yields no URL
    /// - [`FarmError::AdbConnect`] if the local adb attach fails
    pub async fn connect(&mut self, adb: &AdbBridge) -> Result<AllocatedDevice, FarmError> {
        let device = self.select_available_device().await?;
        info!(serial = %device.serial, platform = %device.platform, "farm device selected");

        let remote_connect_url = if self.reserve(&device).await {
            Some(self.remote_connect(&device.serial).await?)
        } else {
            warn!(serial = %device.serial, "proceeding without a remote-connect url");
            None
        };

        if let Some(url) = &remote_connect_url {
            adb.connect(url).map_err(|source| FarmError::AdbConnect {
                serial: device.serial.clone(),
                source,
            })?;
        }

        let allocation = AllocatedDevice {
            device,
            remote_connect_url,
        };
        self.allocated = Some(allocation.clone());
        Ok(allocation)
    }

    /// Deletes the reservation for a serial.
    pub async fn release(&self, serial: &str) -> Result<(), FarmError> {
        let response = self
            .http
            .delete(self.url(&format!("/user/devices/{serial}")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FarmError::Unavailable(format!(
                "DELETE /user/devices/{serial} returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response.json().await?;
        if body.get("success").and_then(serde_json::Value::as_bool) != Some(true) {
            return Err(FarmError::Unavailable(
                "release response reported success=false".to_string(),
            ));
        }
        info!(serial, "farm device released");
        Ok(())
    }

    /// Best-effort release of the allocated device followed by adb detach.
    ///
    /// Each step is independently caught and logged; this method never fails,
    /// so a flaky teardown cannot mask the original test failure.
    pub async fn disconnect(&mut self, adb: &AdbBridge) {
        let Some(allocation) = self.allocated.take() else {
            return;
        };
        if let Err(e) = self.release(&allocation.device.serial).await {
            warn!(serial = %allocation.device.serial, error = %e, "farm release failed");
        }
        if let Err(e) = adb.disconnect() {
            warn!(serial = %allocation.device.serial, error = %e, "adb detach failed");
        }
    }

    /// Re-checks that the allocated device is still held by this client.
    ///
    /// The farm reclaims devices when the reservation lease elapses; a device
    /// that shows up as available again has been released back to the pool.
    ///
    /// # Errors
    ///
    /// - [`FarmError::NotAllocated`] when nothing is held
    /// - [`FarmError::ReservationLost`] when the lease has lapsed
    /// - snapshot-fetch errors from [`get_device`](Self::get_device)
    pub async fn revalidate(&self) -> Result<(), FarmError> {
        let allocation = self.allocated.as_ref().ok_or(FarmError::NotAllocated)?;
        let fresh = self.get_device(&allocation.device.serial).await?;
        if fresh.is_available() {
            return Err(FarmError::ReservationLost(allocation.device.serial.clone()));
        }
        Ok(())
    }
}

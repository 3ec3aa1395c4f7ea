//! Driver-session lifecycle management.
//!
//! [`SessionManager`] is the single source of truth for whether a live
//! driver exists and what platform and capabilities it runs with. It is an
//! explicitly constructed context object: callers build one, pass it around,
//! and there is exactly one active session per manager.
//!
//! The lifecycle is `Absent -> Creating -> Active -> Closing -> Absent`.
//! [`SessionManager::session`] creates the driver lazily: resolving
//! capabilities, allocating a farm device when farm mode or a CI environment
//! is detected, and optionally spawning the local driver server. Teardown is
//! an ordered chain of independent best-effort steps whose outcomes are
//! aggregated into a [`TeardownReport`] instead of thrown, so a flaky
//! release can never shadow the test outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adb::AdbBridge;
use crate::capabilities::{Capabilities, CapabilityError, CapabilityResolver};
use crate::config::{self, Config, Platform};
use crate::driver::{DriverError, DriverFactory, UiDriver, CONTEXT_NATIVE, CONTEXT_REACTIVE};
use crate::farm::{DeviceFarmClient, FarmError};
use crate::server::{DriverServer, ServerError};

/// Implicit element-lookup wait refreshed on every session access.
const IMPLICIT_WAIT: Duration = Duration::from_secs(1);

/// Errors that can occur during session management.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The platform-specific driver could not be constructed.
    #[error("failed to create the driver session: {0}")]
    DriverInit(String),

    /// The requested UI context is not reported by the driver.
    #[error("context '{requested}' is not valid for the running driver; valid contexts: {valid:?}")]
    InvalidContext {
        /// The context that was requested.
        requested: String,
        /// The contexts the driver currently reports.
        valid: Vec<String>,
    },

    /// An operation needed a live session and none exists.
    #[error("no active driver session")]
    NoActiveSession,

    /// Capability resolution failed.
    #[error(transparent)]
    Capabilities(#[from] CapabilityError),

    /// Device-farm allocation failed.
    #[error(transparent)]
    Farm(#[from] FarmError),

    /// The local driver server could not be started.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A driver call outside session construction failed.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Lifecycle state of the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session exists.
    Absent,
    /// A session is being constructed.
    Creating,
    /// The session is live.
    Active,
    /// The session is being torn down.
    Closing,
}

/// The UI surface a session can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiContext {
    /// The native application surface.
    Native,
    /// The embedded reactive UI runtime surface.
    Reactive,
}

impl UiContext {
    /// The context name as reported by drivers.
    pub fn as_str(&self) -> &'static str {
        match self {
            UiContext::Native => CONTEXT_NATIVE,
            UiContext::Reactive => CONTEXT_REACTIVE,
        }
    }
}

/// Outcome of one teardown step.
#[derive(Debug)]
pub struct TeardownStep {
    /// What the step did.
    pub name: &'static str,
    /// `Err` carries the captured failure message.
    pub outcome: Result<(), String>,
}

/// Aggregated outcomes of the teardown chain.
///
/// Failures are observable here without affecting the test outcome.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// The executed steps, in order.
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    fn record(&mut self, name: &'static str, outcome: Result<(), String>) {
        if let Err(message) = &outcome {
            warn!(step = name, error = %message, "teardown step failed");
        }
        self.steps.push(TeardownStep { name, outcome });
    }

    /// Returns true when every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|step| step.outcome.is_ok())
    }

    /// The names of the steps that failed, in order.
    pub fn failures(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .filter(|step| step.outcome.is_err())
            .map(|step| step.name)
            .collect()
    }
}

/// Owns the single active driver session and its collaborators.
pub struct SessionManager {
    config: Arc<Config>,
    factory: Arc<dyn DriverFactory>,
    adb: AdbBridge,
    farm: Option<DeviceFarmClient>,
    server: Option<DriverServer>,
    state: SessionState,
    driver: Option<Arc<dyn UiDriver>>,
    capabilities: Option<Capabilities>,
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionManager {
    /// Creates a manager with the default adb bridge and no pre-built farm
    /// client; one is constructed on demand when farm mode is active.
    pub fn new(config: Arc<Config>, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            config,
            factory,
            adb: AdbBridge::new(),
            farm: None,
            server: None,
            state: SessionState::Absent,
            driver: None,
            capabilities: None,
            session_id: None,
            started_at: None,
        }
    }

    /// Replaces the adb bridge (e.g. a non-default executable).
    pub fn with_adb(mut self, adb: AdbBridge) -> Self {
        self.adb = adb;
        self
    }

    /// Injects a pre-built farm client, e.g. one that has already adopted a
    /// reservation.
    pub fn with_farm(mut self, farm: DeviceFarmClient) -> Self {
        self.farm = Some(farm);
        self
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The capability set of the active session, if any.
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// The id of the active session, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// When the active session was created, if any.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Farm allocation applies when the project enables it or the run
    /// executes on a CI agent, which never has a locally attached device.
    fn farm_mode(&self) -> bool {
        self.config.farm.active || config::is_ci_environment()
    }

    /// Returns the live driver, creating the session first when absent.
    ///
    /// Re-entry on an active session only refreshes the driver's short
    /// implicit wait (and, when configured, re-validates the farm
    /// reservation).
    ///
    /// # Errors
    ///
    /// Construction failures are fatal: farm allocation, capability
    /// resolution, driver-server startup, and driver instantiation errors
    /// all surface to the caller with their cause.
    pub async fn session(&mut self) -> Result<Arc<dyn UiDriver>, SessionError> {
        if self.state == SessionState::Active {
            if let Some(driver) = self.driver.clone() {
                if self.config.farm.revalidate_reservation {
                    if let Some(farm) = &self.farm {
                        farm.revalidate().await?;
                    }
                }
                driver.set_implicit_wait(IMPLICIT_WAIT).await?;
                return Ok(driver);
            }
        }

        self.state = SessionState::Creating;
        match self.create_session().await {
            Ok(driver) => {
                self.state = SessionState::Active;
                Ok(driver)
            }
            Err(e) => {
                self.state = SessionState::Absent;
                Err(e)
            }
        }
    }

    async fn create_session(&mut self) -> Result<Arc<dyn UiDriver>, SessionError> {
        if self.config.driver_server.autostart && self.server.is_none() {
            let mut server = DriverServer::new(self.config.driver_server.clone());
            server.start()?;
            self.server = Some(server);
        }

        let allocation = if self.farm_mode() && self.config.platform == Platform::Android {
            let mut farm = self
                .farm
                .take()
                .unwrap_or_else(|| DeviceFarmClient::new(&self.config.farm));
            let result = farm.connect(&self.adb).await;
            self.farm = Some(farm);
            Some(result?)
        } else {
            None
        };

        let capabilities = CapabilityResolver::resolve(&self.config, allocation.as_ref())?;
        info!(platform = %self.config.platform, "creating driver session");

        let driver = self
            .factory
            .create(
                self.config.platform,
                &self.config.driver_server.url,
                &capabilities,
            )
            .await
            .map_err(|e| SessionError::DriverInit(e.to_string()))?;
        driver
            .set_implicit_wait(IMPLICIT_WAIT)
            .await
            .map_err(|e| SessionError::DriverInit(e.to_string()))?;

        let session_id = Uuid::new_v4();
        self.capabilities = Some(capabilities);
        self.driver = Some(driver.clone());
        self.session_id = Some(session_id);
        self.started_at = Some(Utc::now());
        info!(%session_id, "driver session created");
        Ok(driver)
    }

    /// Switches the driver to the requested UI context.
    ///
    /// A no-op when the context is already current.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidContext`] when the driver rejects the switch;
    /// the error lists the contexts the driver currently reports as valid.
    pub async fn switch_context(&self, context: UiContext) -> Result<(), SessionError> {
        let driver = self.driver.clone().ok_or(SessionError::NoActiveSession)?;
        let current = driver.current_context().await?;
        if current == context.as_str() {
            return Ok(());
        }
        match driver.switch_context(context.as_str()).await {
            Ok(()) => {
                debug!(context = context.as_str(), "driver context switched");
                Ok(())
            }
            Err(_) => {
                let valid = driver.contexts().await.unwrap_or_default();
                Err(SessionError::InvalidContext {
                    requested: context.as_str().to_string(),
                    valid,
                })
            }
        }
    }

    /// Restarts the app under test without dropping the driver session.
    pub async fn restart_app(&self) -> Result<(), SessionError> {
        let driver = self.driver.clone().ok_or(SessionError::NoActiveSession)?;
        let app_id = self.app_identifier().ok_or_else(|| {
            SessionError::DriverInit("no app package or bundle id configured".to_string())
        })?;
        info!(app = %app_id, "restarting application");
        driver.terminate_app(&app_id).await?;
        driver.activate_app(&app_id).await?;
        Ok(())
    }

    /// The identifier used to address the app under test, from the active
    /// capability set or the project config.
    fn app_identifier(&self) -> Option<String> {
        let key = match self.config.platform {
            Platform::Android => "appPackage",
            Platform::Ios => "bundleId",
        };
        if let Some(value) = self.capabilities.as_ref().and_then(|c| c.get_str(key)) {
            return Some(value.to_string());
        }
        match self.config.platform {
            Platform::Android => self.config.capabilities.app_package.clone(),
            Platform::Ios => self.config.capabilities.bundle_id.clone(),
        }
    }

    /// Tears the session down: terminate the app under test, quit the
    /// driver, release the farm device, detach adb, stop the spawned driver
    /// server.
    ///
    /// Every step is independently fault-tolerant; outcomes land in the
    /// returned [`TeardownReport`]. Closing an absent session returns an
    /// empty report.
    pub async fn close_session(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.driver.is_none() && self.farm.is_none() && self.server.is_none() {
            self.state = SessionState::Absent;
            return report;
        }
        self.state = SessionState::Closing;

        if let Some(driver) = self.driver.take() {
            if let Some(app_id) = self.app_identifier() {
                report.record(
                    "terminate app",
                    driver
                        .terminate_app(&app_id)
                        .await
                        .map_err(|e| e.to_string()),
                );
            }
            report.record(
                "quit driver",
                driver.quit().await.map_err(|e| e.to_string()),
            );
        }

        if let Some(mut farm) = self.farm.take() {
            if let Some(allocation) = farm.take_allocation() {
                report.record(
                    "release farm device",
                    farm.release(&allocation.device.serial)
                        .await
                        .map_err(|e| e.to_string()),
                );
                report.record(
                    "detach adb",
                    self.adb.disconnect().map(|_| ()).map_err(|e| e.to_string()),
                );
            }
        }

        if let Some(mut server) = self.server.take() {
            server.stop();
            report.record("stop driver server", Ok(()));
        }

        self.capabilities = None;
        self.session_id = None;
        self.started_at = None;
        self.state = SessionState::Absent;
        info!(clean = report.is_clean(), "session closed");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_names() {
        assert_eq!(UiContext::Native.as_str(), "NATIVE_APP");
        assert_eq!(UiContext::Reactive.as_str(), "REACTIVE_APP");
    }

    #[test]
    fn report_tracks_failures_in_order() {
        let mut report = TeardownReport::default();
        report.record("terminate app", Ok(()));
        report.record("release farm device", Err("timeout".to_string()));
        report.record("detach adb", Ok(()));

        assert!(!report.is_clean());
        assert_eq!(report.failures(), vec!["release farm device"]);
        assert_eq!(report.steps.len(), 3);
    }

    #[test]
    fn empty_report_is_clean() {
        assert!(TeardownReport::default().is_clean());
    }
}

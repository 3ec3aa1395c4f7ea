//! Driver abstraction for backend-agnostic UI automation.
//!
//! This module defines the [`UiDriver`] trait, the seam between tapwire and
//! whatever automation driver actually talks to the device. tapwire does not
//! implement a driver wire protocol itself; it orchestrates and hardens the
//! calls. The interaction engine and session manager work against
//! `Arc<dyn UiDriver>`, so any backend (a remote driver server, an on-device
//! agent, or a test double) plugs in behind the same interface.
//!
//! Native elements are addressed through [`NativeLocator`]s; elements inside
//! an embedded reactive UI runtime go through the `reactive_*` methods with
//! their own locator protocol. Backends without such a runtime can rely on
//! the default implementations, which report the protocol as unsupported.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::capabilities::Capabilities;
use crate::config::Platform;
use crate::element::{NativeLocator, ReactiveLocator, ScreenPoint, ScreenSize};

/// Context name for the native application surface.
pub const CONTEXT_NATIVE: &str = "NATIVE_APP";
/// Context name for the embedded reactive UI runtime surface.
pub const CONTEXT_REACTIVE: &str = "REACTIVE_APP";

/// Errors that can occur during driver operations.
///
/// This enum unifies errors from all backends behind a single type, so the
/// engine's retry policy can treat every backend uniformly.
#[derive(Error, Debug)]
pub enum DriverError {
    /// A command failed with the given message.
    #[error("driver command failed: {0}")]
    CommandFailed(String),

    /// No element matched the locator.
    #[error("no such element: {0}")]
    NoSuchElement(String),

    /// A wait expired before its condition held.
    #[error("wait timed out after {0:?}")]
    WaitTimeout(Duration),

    /// The requested context is not reported by the driver.
    #[error("unknown context '{0}'")]
    NoSuchContext(String),

    /// The backend is not connected.
    #[error("not connected to a driver session")]
    NotConnected,

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Single-finger press, move, release gesture in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeGesture {
    /// Where the finger goes down.
    pub from: ScreenPoint,
    /// Where the finger lifts.
    pub to: ScreenPoint,
    /// Duration of the move between the two points.
    pub move_duration: Duration,
}

/// Trait for the live driver session bound to one device and one app.
///
/// All methods are async so both TCP-based backends and subprocess-wrapped
/// ones fit behind the same interface.
#[async_trait]
pub trait UiDriver: Send + Sync + std::fmt::Debug {
    /// Wait until the element is present and visible, up to `timeout`.
    async fn wait_visible(
        &self,
        locator: &NativeLocator,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Wait until the element is gone or hidden, up to `timeout`.
    async fn wait_hidden(
        &self,
        locator: &NativeLocator,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Whether the element is currently displayed.
    async fn is_displayed(&self, locator: &NativeLocator) -> Result<bool, DriverError>;

    /// The element's visible text.
    async fn text_of(&self, locator: &NativeLocator) -> Result<String, DriverError>;

    /// Click the element.
    async fn click(&self, locator: &NativeLocator) -> Result<(), DriverError>;

    /// Type text into the element.
    async fn send_keys(&self, locator: &NativeLocator, text: &str) -> Result<(), DriverError>;

    /// Clear the element's text content.
    async fn clear(&self, locator: &NativeLocator) -> Result<(), DriverError>;

    /// Locate a nested editable control inside the element, if any.
    ///
    /// Compound widgets often wrap the actual input field; text entry should
    /// target the inner control when one exists.
    async fn find_editable_child(
        &self,
        locator: &NativeLocator,
    ) -> Result<Option<NativeLocator>, DriverError>;

    /// Top-left corner of the element in screen coordinates.
    async fn location_of(&self, locator: &NativeLocator) -> Result<ScreenPoint, DriverError>;

    /// Dimensions of the device screen.
    async fn screen_size(&self) -> Result<ScreenSize, DriverError>;

    /// Execute a synthesized single-finger gesture.
    async fn perform_gesture(&self, gesture: &SwipeGesture) -> Result<(), DriverError>;

    /// Send a return-key press to the currently focused element.
    async fn press_return_key(&self) -> Result<(), DriverError>;

    /// Wait until a reactive element exists, up to `timeout`.
    ///
    /// The default implementation reports the protocol as unsupported.
    async fn reactive_wait_for(
        &self,
        locator: &ReactiveLocator,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let _ = (locator, timeout);
        Err(DriverError::CommandFailed(
            "reactive locator protocol not supported by this backend".to_string(),
        ))
    }

    /// Wait until a reactive element is absent, up to `timeout`.
    async fn reactive_wait_absent(
        &self,
        locator: &ReactiveLocator,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let _ = (locator, timeout);
        Err(DriverError::CommandFailed(
            "reactive locator protocol not supported by this backend".to_string(),
        ))
    }

    /// Tap a reactive element.
    async fn reactive_tap(&self, locator: &ReactiveLocator) -> Result<(), DriverError> {
        let _ = locator;
        Err(DriverError::CommandFailed(
            "reactive locator protocol not supported by this backend".to_string(),
        ))
    }

    /// Type text into a reactive element.
    async fn reactive_send_keys(
        &self,
        locator: &ReactiveLocator,
        text: &str,
    ) -> Result<(), DriverError> {
        let _ = (locator, text);
        Err(DriverError::CommandFailed(
            "reactive locator protocol not supported by this backend".to_string(),
        ))
    }

    /// The visible text of a reactive element.
    async fn reactive_text_of(&self, locator: &ReactiveLocator) -> Result<String, DriverError> {
        let _ = locator;
        Err(DriverError::CommandFailed(
            "reactive locator protocol not supported by this backend".to_string(),
        ))
    }

    /// Scroll a reactive element into view.
    ///
    /// `alignment` positions the element within the viewport: 0.0 aligns it
    /// to the leading edge, 0.5 centers it.
    async fn reactive_scroll_into_view(
        &self,
        locator: &ReactiveLocator,
        alignment: f64,
    ) -> Result<(), DriverError> {
        let _ = (locator, alignment);
        Err(DriverError::CommandFailed(
            "reactive locator protocol not supported by this backend".to_string(),
        ))
    }

    /// Context names currently reported as valid by the driver.
    async fn contexts(&self) -> Result<Vec<String>, DriverError>;

    /// The context currently in effect.
    async fn current_context(&self) -> Result<String, DriverError>;

    /// Switch to the named context.
    async fn switch_context(&self, name: &str) -> Result<(), DriverError>;

    /// Refresh the driver's implicit element-lookup wait.
    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Capture a screenshot of the current screen as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Terminate the app with the given package or bundle identifier.
    async fn terminate_app(&self, app_id: &str) -> Result<(), DriverError>;

    /// Activate (foreground, launching if needed) the app with the given
    /// package or bundle identifier.
    async fn activate_app(&self, app_id: &str) -> Result<(), DriverError>;

    /// End the driver session.
    async fn quit(&self) -> Result<(), DriverError>;
}

/// Constructs the platform-specific driver for a session.
///
/// The session manager owns the lifecycle; the factory only knows how to
/// build a connected driver from the negotiated capabilities.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Create a driver session against `server_url` with the given
    /// capabilities.
    async fn create(
        &self,
        platform: Platform,
        server_url: &str,
        capabilities: &Capabilities,
    ) -> Result<Arc<dyn UiDriver>, DriverError>;
}

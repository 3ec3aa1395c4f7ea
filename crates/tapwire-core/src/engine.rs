//! The resilient interaction engine.
//!
//! Every UI action goes through this layer, which wraps the raw driver call
//! with a bounded retry policy, a per-call timeout override, and a dual
//! dispatch between native-tree elements and reactive-runtime elements. The
//! target is inherently flaky (animations, late layouts, dropped driver
//! connections), so the engine's job is to make actions behave
//! deterministically anyway: a transient failure is retried up to a fixed
//! ceiling, and only then becomes terminal.
//!
//! Callers choose, per call, whether a failure is reported or swallowed.
//! With `report_failure = false` the first failure degrades to `false`
//! without retrying, which lets tests probe for optional UI (a permissions
//! dialog, a one-time banner) without aborting.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use thiserror::Error;

use crate::config::{Config, Platform};
use crate::driver::{DriverError, SwipeGesture, UiDriver, CONTEXT_NATIVE};
use crate::element::{ElementHandle, NativeLocator, ScreenPoint};
use crate::ocr::{OcrError, OcrFallback};

/// Consecutive failures tolerated before a retryable failure turns terminal.
const MAX_TRIES: u8 = 3;
/// Duration of the move segment of a synthesized scroll gesture.
const SCROLL_MOVE_DURATION: Duration = Duration::from_millis(700);
/// Default vertical start of a scroll gesture, as a fraction of the screen.
const SCROLL_START_FRACTION: f64 = 0.80;
/// Default vertical end of a scroll gesture, as a fraction of the screen.
const SCROLL_END_FRACTION: f64 = 0.20;
/// Gestures stay this many points clear of the screen edge.
const SCREEN_EDGE_INSET: u32 = 10;
/// Short visibility probe used between scroll attempts.
const SCROLL_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
/// Alignment that centers an element when the reactive runtime scrolls it
/// into view.
const CENTER_ALIGNMENT: f64 = 0.5;

/// Errors produced by the interaction layer.
#[derive(Error, Debug)]
pub enum InteractionError {
    /// The element never became visible within the retry ceiling.
    #[error("element [{element}] not visible after {attempts} attempts: {source}")]
    NotVisible {
        /// The element that was checked.
        element: String,
        /// How many bounded-retry attempts were made.
        attempts: u8,
        /// The last underlying failure.
        #[source]
        source: DriverError,
    },

    /// The element could not be clicked within the retry ceiling.
    #[error("failed to click element [{element}]: {source}")]
    ClickFailed {
        /// The element that was clicked.
        element: String,
        /// The last underlying failure.
        #[source]
        source: DriverError,
    },

    /// The element was still on screen when the wait expired.
    #[error("element [{element}] did not disappear within {timeout:?}: {source}")]
    StillVisible {
        /// The element that was waited on.
        element: String,
        /// The wait window that expired.
        timeout: Duration,
        /// The last underlying failure.
        #[source]
        source: DriverError,
    },

    /// Scrolling never brought the element on screen.
    #[error(
        "element [{element}] not found after scrolling; {remaining} scroll attempts remaining"
    )]
    NotFoundAfterScroll {
        /// The element that was searched for.
        element: String,
        /// Scroll attempts left when the search gave up.
        remaining: u32,
    },

    /// The operation has no meaning for reactive-runtime elements.
    #[error("'{0}' is not supported for reactive elements")]
    ReactiveUnsupported(&'static str),

    /// OCR verification was requested but no recognizer is configured.
    #[error("no OCR recognizer configured for this engine")]
    OcrUnavailable,

    /// A driver call failed outside a retryable path.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// An OCR verification failed.
    #[error(transparent)]
    Ocr(#[from] OcrError),
}

/// Bounded-retry accounting for one interaction.
///
/// The budget lives on the call stack of a single interaction: it is reset
/// by construction for every call, so unrelated calls can never share retry
/// state.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    tries: u8,
    ceiling: u8,
}

impl RetryBudget {
    /// A fresh budget with the given ceiling.
    pub fn new(ceiling: u8) -> Self {
        Self { tries: 0, ceiling }
    }

    /// Records a failed attempt. Returns true while another attempt is
    /// allowed.
    pub fn register_failure(&mut self) -> bool {
        self.tries += 1;
        self.tries < self.ceiling
    }

    /// How many attempts have failed so far.
    pub fn attempts(&self) -> u8 {
        self.tries
    }
}

/// Options for [`InteractionEngine::scroll_to_element_with`].
#[derive(Debug, Clone, Copy)]
pub struct ScrollOptions {
    /// Vertical gesture start as a fraction of the screen height.
    pub start_fraction: f64,
    /// Vertical gesture end as a fraction of the screen height.
    pub end_fraction: f64,
    /// Scroll toward the top of the content instead of the bottom.
    pub scroll_up: bool,
    /// Gestures performed before the search gives up.
    pub max_attempts: u32,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            start_fraction: SCROLL_START_FRACTION,
            end_fraction: SCROLL_END_FRACTION,
            scroll_up: false,
            max_attempts: 10,
        }
    }
}

/// The resilience layer over a [`UiDriver`].
pub struct InteractionEngine {
    driver: Arc<dyn UiDriver>,
    platform: Platform,
    timeout: Duration,
    default_scroll_attempts: u32,
    ocr: Option<OcrFallback>,
}

impl InteractionEngine {
    /// Creates an engine with the default 20-second wait window.
    pub fn new(driver: Arc<dyn UiDriver>, platform: Platform) -> Self {
        Self {
            driver,
            platform,
            timeout: Duration::from_secs(20),
            default_scroll_attempts: ScrollOptions::default().max_attempts,
            ocr: None,
        }
    }

    /// Creates an engine with timing taken from the project config.
    pub fn from_config(driver: Arc<dyn UiDriver>, config: &Config) -> Self {
        Self {
            driver,
            platform: config.platform,
            timeout: Duration::from_secs(config.interaction.wait_timeout_secs),
            default_scroll_attempts: config.interaction.scroll_attempts,
            ocr: None,
        }
    }

    /// Sets the engine's default wait window.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attaches an OCR fallback for screenshot-based verification.
    pub fn with_ocr(mut self, ocr: OcrFallback) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// The engine's default wait window.
    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// The underlying driver.
    pub fn driver(&self) -> &Arc<dyn UiDriver> {
        &self.driver
    }

    /// Checks that the element is visible and, for native elements, that its
    /// text contains `expected_text` (the empty string always matches).
    ///
    /// Reactive elements are checked through the runtime's own wait command;
    /// a non-failing return counts as visible and text containment is not
    /// evaluated for that kind.
    ///
    /// With `report_failure`, a failing check is retried up to the ceiling
    /// and then raised as [`InteractionError::NotVisible`] carrying the last
    /// underlying error. Without it, the first failure returns `false`.
    pub async fn is_visible(
        &self,
        element: &ElementHandle,
        expected_text: &str,
        report_failure: bool,
    ) -> Result<bool, InteractionError> {
        self.is_visible_within(element, expected_text, report_failure, None)
            .await
    }

    /// Like [`is_visible`](Self::is_visible) with a wait window for this
    /// call only; the engine default is untouched and later calls are not
    /// affected by the override.
    pub async fn is_visible_within(
        &self,
        element: &ElementHandle,
        expected_text: &str,
        report_failure: bool,
        timeout: Option<Duration>,
    ) -> Result<bool, InteractionError> {
        let timeout = timeout.unwrap_or(self.timeout);
        let mut budget = RetryBudget::new(MAX_TRIES);
        loop {
            match self.check_visible(element, expected_text, timeout).await {
                Ok(visible) => return Ok(visible),
                Err(err) => {
                    if !report_failure {
                        warn!(element = %element.describe(), error = %err, "visibility check failed");
                        return Ok(false);
                    }
                    if budget.register_failure() {
                        debug!(
                            element = %element.describe(),
                            attempt = budget.attempts(),
                            "retrying visibility check"
                        );
                        continue;
                    }
                    return Err(InteractionError::NotVisible {
                        element: element.describe(),
                        attempts: budget.attempts(),
                        source: err,
                    });
                }
            }
        }
    }

    async fn check_visible(
        &self,
        element: &ElementHandle,
        expected_text: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        match element {
            ElementHandle::Reactive(locator) => {
                self.driver.reactive_wait_for(locator, timeout).await?;
                Ok(true)
            }
            ElementHandle::Native(locator) => {
                self.driver.wait_visible(locator, timeout).await?;
                let displayed = self.driver.is_displayed(locator).await?;
                if expected_text.is_empty() {
                    return Ok(displayed);
                }
                let text = self.driver.text_of(locator).await?;
                Ok(displayed && text.contains(expected_text))
            }
        }
    }

    /// Clicks the element once it is visible.
    ///
    /// A missing-element failure is retried up to the ceiling; with
    /// `report_failure = false` any failure is logged and swallowed.
    pub async fn click(
        &self,
        element: &ElementHandle,
        report_failure: bool,
    ) -> Result<(), InteractionError> {
        let mut budget = RetryBudget::new(MAX_TRIES);
        loop {
            if !self.is_visible(element, "", report_failure).await? {
                info!(element = %element.describe(), "click skipped; element not visible");
                return Ok(());
            }
            let attempt = match element {
                ElementHandle::Reactive(locator) => self.driver.reactive_tap(locator).await,
                ElementHandle::Native(locator) => self.driver.click(locator).await,
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if !report_failure {
                        warn!(element = %element.describe(), error = %err, "click failed");
                        return Ok(());
                    }
                    if matches!(err, DriverError::NoSuchElement(_)) && budget.register_failure() {
                        debug!(
                            element = %element.describe(),
                            attempt = budget.attempts(),
                            "retrying click"
                        );
                        continue;
                    }
                    return Err(InteractionError::ClickFailed {
                        element: element.describe(),
                        source: err,
                    });
                }
            }
        }
    }

    /// Types `text` into the field.
    ///
    /// The field is clicked first. Native compound widgets are probed for a
    /// nested editable control, which receives the keys when present; the
    /// outer element is the fallback. On iOS the on-screen keyboard is then
    /// dismissed best-effort by switching to the native context and sending
    /// a return key; a missing keyboard is not a failure.
    pub async fn set_text(
        &self,
        text: &str,
        field: &ElementHandle,
        report_failure: bool,
    ) -> Result<(), InteractionError> {
        self.click(field, report_failure).await?;

        match field {
            ElementHandle::Reactive(locator) => {
                self.driver.reactive_send_keys(locator, text).await?;
            }
            ElementHandle::Native(locator) => {
                if let Some(inner) = self.driver.find_editable_child(locator).await? {
                    self.is_visible(&ElementHandle::Native(inner.clone()), "", true)
                        .await?;
                    self.driver.send_keys(&inner, text).await?;
                } else {
                    self.driver.send_keys(locator, text).await?;
                }
            }
        }

        if self.platform == Platform::Ios {
            self.dismiss_ios_keyboard().await;
        }
        Ok(())
    }

    async fn dismiss_ios_keyboard(&self) {
        let result = async {
            self.driver.switch_context(CONTEXT_NATIVE).await?;
            self.driver.press_return_key().await
        }
        .await;
        match result {
            Ok(()) => tokio::time::sleep(Duration::from_secs(1)).await,
            Err(err) => {
                info!(error = %err, "keyboard not dismissed; no active keyboard found");
            }
        }
    }

    /// Reads the element's visible text, failing if it never becomes
    /// visible.
    pub async fn get_text(&self, element: &ElementHandle) -> Result<String, InteractionError> {
        self.is_visible(element, "", true).await?;
        let text = match element {
            ElementHandle::Reactive(locator) => self.driver.reactive_text_of(locator).await?,
            ElementHandle::Native(locator) => self.driver.text_of(locator).await?,
        };
        Ok(text)
    }

    /// Reads the text of the editable control nested inside a native field.
    ///
    /// # Errors
    ///
    /// [`InteractionError::ReactiveUnsupported`] for reactive elements;
    /// use [`get_text`](Self::get_text) for those.
    pub async fn get_text_field(
        &self,
        element: &ElementHandle,
    ) -> Result<String, InteractionError> {
        let locator = self.native_only(element, "get_text_field")?;
        self.is_visible(element, "", true).await?;
        let inner = self
            .driver
            .find_editable_child(locator)
            .await?
            .ok_or_else(|| {
                DriverError::NoSuchElement(format!(
                    "no editable control inside [{}]",
                    element.describe()
                ))
            })?;
        Ok(self.driver.text_of(&inner).await?)
    }

    /// Clears the editable control nested inside a native field.
    pub async fn clear_field(&self, element: &ElementHandle) -> Result<(), InteractionError> {
        let locator = self.native_only(element, "clear_field")?;
        if self.is_visible(element, "", true).await? {
            let inner = self
                .driver
                .find_editable_child(locator)
                .await?
                .ok_or_else(|| {
                    DriverError::NoSuchElement(format!(
                        "no editable control inside [{}]",
                        element.describe()
                    ))
                })?;
            self.driver.clear(&inner).await?;
        }
        Ok(())
    }

    /// Waits for the element to leave the screen.
    pub async fn wait_disappear(
        &self,
        element: &ElementHandle,
        timeout: Option<Duration>,
        report_failure: bool,
    ) -> Result<(), InteractionError> {
        let timeout = timeout.unwrap_or(self.timeout);
        let mut budget = RetryBudget::new(MAX_TRIES);
        loop {
            let result = match element {
                ElementHandle::Reactive(locator) => {
                    self.driver.reactive_wait_absent(locator, timeout).await
                }
                ElementHandle::Native(locator) => self.driver.wait_hidden(locator, timeout).await,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if !report_failure {
                        warn!(element = %element.describe(), error = %err, "element still visible");
                        return Ok(());
                    }
                    if budget.register_failure() {
                        continue;
                    }
                    return Err(InteractionError::StillVisible {
                        element: element.describe(),
                        timeout,
                        source: err,
                    });
                }
            }
        }
    }

    /// Performs one scroll gesture with the default screen fractions.
    pub async fn scroll(&self, scroll_up: bool) -> Result<(), InteractionError> {
        self.scroll_between(SCROLL_START_FRACTION, 0.35, scroll_up).await
    }

    /// Performs one scroll gesture between two screen-height fractions.
    pub async fn scroll_between(
        &self,
        start_fraction: f64,
        end_fraction: f64,
        scroll_up: bool,
    ) -> Result<(), InteractionError> {
        self.ensure_native_context().await?;
        let size = self.driver.screen_size().await?;
        let x = (size.width / 2) as i32;
        let usable = f64::from(size.height.saturating_sub(SCREEN_EDGE_INSET));
        let start_y = (usable * start_fraction) as i32;
        let end_y = (usable * end_fraction) as i32;
        let (from_y, to_y) = if scroll_up {
            (end_y, start_y)
        } else {
            (start_y, end_y)
        };
        let gesture = SwipeGesture {
            from: ScreenPoint { x, y: from_y },
            to: ScreenPoint { x, y: to_y },
            move_duration: SCROLL_MOVE_DURATION,
        };
        debug!(?gesture, "performing scroll gesture");
        Ok(self.driver.perform_gesture(&gesture).await?)
    }

    /// Scrolls until the element is visible, using the engine's default
    /// attempt budget, then centers it on screen.
    pub async fn scroll_to_element(
        &self,
        element: &ElementHandle,
    ) -> Result<(), InteractionError> {
        self.scroll_to_element_with(
            element,
            ScrollOptions {
                max_attempts: self.default_scroll_attempts,
                ..ScrollOptions::default()
            },
        )
        .await
    }

    /// Scrolls until the element is visible, then centers it on screen.
    ///
    /// Between gestures the element is probed with a short one-second
    /// visibility check. Reactive elements bypass gesture synthesis: the
    /// runtime scrolls them into view itself, centered.
    ///
    /// # Errors
    ///
    /// [`InteractionError::NotFoundAfterScroll`] when the attempt budget is
    /// exhausted without the element appearing.
    pub async fn scroll_to_element_with(
        &self,
        element: &ElementHandle,
        options: ScrollOptions,
    ) -> Result<(), InteractionError> {
        if let ElementHandle::Reactive(locator) = element {
            return Ok(self
                .driver
                .reactive_scroll_into_view(locator, CENTER_ALIGNMENT)
                .await?);
        }

        let mut remaining = options.max_attempts;
        while !self
            .is_visible_within(element, "", false, Some(SCROLL_PROBE_TIMEOUT))
            .await?
            && remaining > 0
        {
            self.scroll_between(options.start_fraction, options.end_fraction, options.scroll_up)
                .await?;
            remaining -= 1;
        }

        if !self
            .is_visible_within(element, "", false, Some(SCROLL_PROBE_TIMEOUT))
            .await?
        {
            return Err(InteractionError::NotFoundAfterScroll {
                element: element.describe(),
                remaining,
            });
        }
        self.scroll_element_to_middle(element).await
    }

    /// Centers a visible element on the screen.
    pub async fn scroll_element_to_middle(
        &self,
        element: &ElementHandle,
    ) -> Result<(), InteractionError> {
        match element {
            ElementHandle::Reactive(locator) => Ok(self
                .driver
                .reactive_scroll_into_view(locator, CENTER_ALIGNMENT)
                .await?),
            ElementHandle::Native(locator) => {
                let size = self.driver.screen_size().await?;
                let center_x = (size.width / 2) as i32;
                let center_y = (size.height / 2) as i32;
                let max_y = size.height.saturating_sub(SCREEN_EDGE_INSET) as i32;
                let location = self.driver.location_of(locator).await?;
                let gesture = SwipeGesture {
                    from: ScreenPoint {
                        x: center_x,
                        y: location.y.min(max_y),
                    },
                    to: ScreenPoint {
                        x: center_x,
                        y: center_y,
                    },
                    move_duration: SCROLL_MOVE_DURATION,
                };
                Ok(self.driver.perform_gesture(&gesture).await?)
            }
        }
    }

    /// Drags vertically from `source` to the vertical position of `target`.
    pub async fn scroll_move_to(
        &self,
        source: &ElementHandle,
        target: &ElementHandle,
    ) -> Result<(), InteractionError> {
        let (source, target) = (
            self.native_only(source, "scroll_move_to")?,
            self.native_only(target, "scroll_move_to")?,
        );
        let from = self.driver.location_of(source).await?;
        let to = self.driver.location_of(target).await?;
        let gesture = SwipeGesture {
            from,
            to: ScreenPoint { x: from.x, y: to.y },
            move_duration: SCROLL_MOVE_DURATION,
        };
        Ok(self.driver.perform_gesture(&gesture).await?)
    }

    /// Drags horizontally from `source` to the horizontal position of
    /// `target`.
    pub async fn scroll_move_to_horizontal(
        &self,
        source: &ElementHandle,
        target: &ElementHandle,
    ) -> Result<(), InteractionError> {
        let (source, target) = (
            self.native_only(source, "scroll_move_to_horizontal")?,
            self.native_only(target, "scroll_move_to_horizontal")?,
        );
        let from = self.driver.location_of(source).await?;
        let to = self.driver.location_of(target).await?;
        let gesture = SwipeGesture {
            from,
            to: ScreenPoint { x: to.x, y: from.y },
            move_duration: SCROLL_MOVE_DURATION,
        };
        Ok(self.driver.perform_gesture(&gesture).await?)
    }

    /// Verifies the presence or absence of text in a screenshot via the OCR
    /// fallback.
    pub async fn verify_text_in_screenshot(
        &self,
        expected: &str,
        should_contain: bool,
    ) -> Result<bool, InteractionError> {
        let ocr = self.ocr.as_ref().ok_or(InteractionError::OcrUnavailable)?;
        let screenshot = self.driver.screenshot().await?;
        Ok(ocr.verify_text(&screenshot, expected, should_contain)?)
    }

    /// Finds the on-screen position of text via the OCR fallback.
    pub async fn find_text_position_in_screenshot(
        &self,
        text: &str,
    ) -> Result<ScreenPoint, InteractionError> {
        let ocr = self.ocr.as_ref().ok_or(InteractionError::OcrUnavailable)?;
        let screenshot = self.driver.screenshot().await?;
        Ok(ocr.find_text_position(&screenshot, text)?)
    }

    /// Gestures address the native surface; switch back if a reactive
    /// interaction left another context current.
    async fn ensure_native_context(&self) -> Result<(), InteractionError> {
        let current = self.driver.current_context().await?;
        if current != CONTEXT_NATIVE {
            self.driver.switch_context(CONTEXT_NATIVE).await?;
        }
        Ok(())
    }

    fn native_only<'e>(
        &self,
        element: &'e ElementHandle,
        operation: &'static str,
    ) -> Result<&'e NativeLocator, InteractionError> {
        match element {
            ElementHandle::Native(locator) => Ok(locator),
            ElementHandle::Reactive(_) => Err(InteractionError::ReactiveUnsupported(operation)),
        }
    }
}

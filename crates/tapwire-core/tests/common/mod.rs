//! Shared test doubles: a scriptable driver and a driver factory.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use tapwire_core::capabilities::Capabilities;
use tapwire_core::config::Platform;
use tapwire_core::driver::{
    DriverError, DriverFactory, SwipeGesture, UiDriver, CONTEXT_NATIVE, CONTEXT_REACTIVE,
};
use tapwire_core::element::{NativeLocator, ReactiveLocator, ScreenPoint, ScreenSize};

/// Canonical key for a native locator, used to script the mock.
pub fn native_key(locator: &NativeLocator) -> String {
    match locator {
        NativeLocator::Id(id) => format!("id:{id}"),
        NativeLocator::Xpath(xpath) => format!("xpath:{xpath}"),
    }
}

/// Canonical key for a reactive locator, used to script the mock.
pub fn reactive_key(locator: &ReactiveLocator) -> String {
    format!("{locator:?}")
}

/// Scriptable driver state. Tests set up the fields directly and inspect the
/// recorded calls afterwards.
pub struct MockState {
    // scripted behavior
    pub visible: HashSet<String>,
    pub visible_after: HashMap<String, u32>,
    pub click_failures: HashMap<String, u32>,
    pub texts: HashMap<String, String>,
    pub editable_children: HashMap<String, NativeLocator>,
    pub locations: HashMap<String, ScreenPoint>,
    pub screen: ScreenSize,
    pub contexts: Vec<String>,
    pub current_context: String,
    pub screenshot: Vec<u8>,
    pub fail_return_key: bool,
    pub fail_terminate: bool,

    // recorded calls
    pub wait_calls: Vec<(String, Duration)>,
    pub hidden_wait_calls: Vec<(String, Duration)>,
    pub reactive_wait_calls: Vec<(String, Duration)>,
    pub clicks: Vec<String>,
    pub reactive_taps: Vec<String>,
    pub keys_sent: Vec<(String, String)>,
    pub cleared: Vec<String>,
    pub gestures: Vec<SwipeGesture>,
    pub scroll_into_view_calls: Vec<(String, f64)>,
    pub context_switches: Vec<String>,
    pub implicit_waits: Vec<Duration>,
    pub return_key_presses: u32,
    pub terminated: Vec<String>,
    pub activated: Vec<String>,
    pub quit_calls: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            visible: HashSet::new(),
            visible_after: HashMap::new(),
            click_failures: HashMap::new(),
            texts: HashMap::new(),
            editable_children: HashMap::new(),
            locations: HashMap::new(),
            screen: ScreenSize {
                width: 1080,
                height: 2340,
            },
            contexts: vec![CONTEXT_NATIVE.to_string(), CONTEXT_REACTIVE.to_string()],
            current_context: CONTEXT_NATIVE.to_string(),
            screenshot: Vec::new(),
            fail_return_key: false,
            fail_terminate: false,
            wait_calls: Vec::new(),
            hidden_wait_calls: Vec::new(),
            reactive_wait_calls: Vec::new(),
            clicks: Vec::new(),
            reactive_taps: Vec::new(),
            keys_sent: Vec::new(),
            cleared: Vec::new(),
            gestures: Vec::new(),
            scroll_into_view_calls: Vec::new(),
            context_switches: Vec::new(),
            implicit_waits: Vec::new(),
            return_key_presses: 0,
            terminated: Vec::new(),
            activated: Vec::new(),
            quit_calls: 0,
        }
    }
}

/// A scriptable [`UiDriver`] for tests.
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockDriver")
    }
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
        })
    }

    /// Direct access to the scripted state.
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Marks an element as visible from the start.
    pub fn make_visible(&self, key: &str) {
        self.state().visible.insert(key.to_string());
    }
}

#[async_trait]
impl UiDriver for MockDriver {
    async fn wait_visible(
        &self,
        locator: &NativeLocator,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let key = native_key(locator);
        let mut guard = self.state();
        let state = &mut *guard;
        state.wait_calls.push((key.clone(), timeout));
        if state.visible.contains(&key) {
            return Ok(());
        }
        if let Some(remaining) = state.visible_after.get_mut(&key) {
            if *remaining == 0 {
                state.visible.insert(key);
                return Ok(());
            }
            *remaining -= 1;
        }
        Err(DriverError::WaitTimeout(timeout))
    }

    async fn wait_hidden(
        &self,
        locator: &NativeLocator,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let key = native_key(locator);
        let mut state = self.state();
        state.hidden_wait_calls.push((key.clone(), timeout));
        if state.visible.contains(&key) {
            Err(DriverError::WaitTimeout(timeout))
        } else {
            Ok(())
        }
    }

    async fn is_displayed(&self, locator: &NativeLocator) -> Result<bool, DriverError> {
        Ok(self.state().visible.contains(&native_key(locator)))
    }

    async fn text_of(&self, locator: &NativeLocator) -> Result<String, DriverError> {
        Ok(self
            .state()
            .texts
            .get(&native_key(locator))
            .cloned()
            .unwrap_or_default())
    }

    async fn click(&self, locator: &NativeLocator) -> Result<(), DriverError> {
        let key = native_key(locator);
        let mut guard = self.state();
        let state = &mut *guard;
        if let Some(remaining) = state.click_failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::NoSuchElement(key));
            }
        }
        state.clicks.push(key);
        Ok(())
    }

    async fn send_keys(&self, locator: &NativeLocator, text: &str) -> Result<(), DriverError> {
        self.state()
            .keys_sent
            .push((native_key(locator), text.to_string()));
        Ok(())
    }

    async fn clear(&self, locator: &NativeLocator) -> Result<(), DriverError> {
        self.state().cleared.push(native_key(locator));
        Ok(())
    }

    async fn find_editable_child(
        &self,
        locator: &NativeLocator,
    ) -> Result<Option<NativeLocator>, DriverError> {
        Ok(self
            .state()
            .editable_children
            .get(&native_key(locator))
            .cloned())
    }

    async fn location_of(&self, locator: &NativeLocator) -> Result<ScreenPoint, DriverError> {
        let key = native_key(locator);
        self.state()
            .locations
            .get(&key)
            .copied()
            .ok_or(DriverError::NoSuchElement(key))
    }

    async fn screen_size(&self) -> Result<ScreenSize, DriverError> {
        Ok(self.state().screen)
    }

    async fn perform_gesture(&self, gesture: &SwipeGesture) -> Result<(), DriverError> {
        self.state().gestures.push(*gesture);
        Ok(())
    }

    async fn press_return_key(&self) -> Result<(), DriverError> {
        let mut state = self.state();
        if state.fail_return_key {
            return Err(DriverError::CommandFailed("no active keyboard".to_string()));
        }
        state.return_key_presses += 1;
        Ok(())
    }

    async fn reactive_wait_for(
        &self,
        locator: &ReactiveLocator,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let key = reactive_key(locator);
        let mut guard = self.state();
        let state = &mut *guard;
        state.reactive_wait_calls.push((key.clone(), timeout));
        if state.visible.contains(&key) {
            return Ok(());
        }
        if let Some(remaining) = state.visible_after.get_mut(&key) {
            if *remaining == 0 {
                state.visible.insert(key);
                return Ok(());
            }
            *remaining -= 1;
        }
        Err(DriverError::WaitTimeout(timeout))
    }

    async fn reactive_wait_absent(
        &self,
        locator: &ReactiveLocator,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        if self.state().visible.contains(&reactive_key(locator)) {
            Err(DriverError::WaitTimeout(timeout))
        } else {
            Ok(())
        }
    }

    async fn reactive_tap(&self, locator: &ReactiveLocator) -> Result<(), DriverError> {
        self.state().reactive_taps.push(reactive_key(locator));
        Ok(())
    }

    async fn reactive_send_keys(
        &self,
        locator: &ReactiveLocator,
        text: &str,
    ) -> Result<(), DriverError> {
        self.state()
            .keys_sent
            .push((reactive_key(locator), text.to_string()));
        Ok(())
    }

    async fn reactive_text_of(&self, locator: &ReactiveLocator) -> Result<String, DriverError> {
        Ok(self
            .state()
            .texts
            .get(&reactive_key(locator))
            .cloned()
            .unwrap_or_default())
    }

    async fn reactive_scroll_into_view(
        &self,
        locator: &ReactiveLocator,
        alignment: f64,
    ) -> Result<(), DriverError> {
        self.state()
            .scroll_into_view_calls
            .push((reactive_key(locator), alignment));
        Ok(())
    }

    async fn contexts(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.state().contexts.clone())
    }

    async fn current_context(&self) -> Result<String, DriverError> {
        Ok(self.state().current_context.clone())
    }

    async fn switch_context(&self, name: &str) -> Result<(), DriverError> {
        let mut state = self.state();
        if !state.contexts.iter().any(|c| c == name) {
            return Err(DriverError::NoSuchContext(name.to_string()));
        }
        state.current_context = name.to_string();
        state.context_switches.push(name.to_string());
        Ok(())
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), DriverError> {
        self.state().implicit_waits.push(timeout);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(self.state().screenshot.clone())
    }

    async fn terminate_app(&self, app_id: &str) -> Result<(), DriverError> {
        let mut state = self.state();
        if state.fail_terminate {
            return Err(DriverError::CommandFailed("app not running".to_string()));
        }
        state.terminated.push(app_id.to_string());
        Ok(())
    }

    async fn activate_app(&self, app_id: &str) -> Result<(), DriverError> {
        self.state().activated.push(app_id.to_string());
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.state().quit_calls += 1;
        Ok(())
    }
}

/// Factory handing out a fixed mock driver, optionally failing instead.
pub struct MockFactory {
    pub driver: Arc<MockDriver>,
    pub fail_with: Option<String>,
}

impl MockFactory {
    pub fn returning(driver: Arc<MockDriver>) -> Arc<Self> {
        Arc::new(Self {
            driver,
            fail_with: None,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            driver: MockDriver::new(),
            fail_with: Some(message.to_string()),
        })
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    async fn create(
        &self,
        _platform: Platform,
        _server_url: &str,
        _capabilities: &Capabilities,
    ) -> Result<Arc<dyn UiDriver>, DriverError> {
        match &self.fail_with {
            Some(message) => Err(DriverError::CommandFailed(message.clone())),
            None => Ok(self.driver.clone()),
        }
    }
}

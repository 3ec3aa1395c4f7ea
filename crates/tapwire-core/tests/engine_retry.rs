//! Bounded-retry, failure-reporting, and timeout-scoping behavior of the
//! interaction engine.

mod common;

use std::time::Duration;

use common::{native_key, MockDriver};
use tapwire_core::config::Platform;
use tapwire_core::element::{ElementHandle, NativeLocator};
use tapwire_core::engine::{InteractionEngine, InteractionError};

fn engine(driver: &std::sync::Arc<MockDriver>) -> InteractionEngine {
    InteractionEngine::new(driver.clone(), Platform::Android)
}

#[tokio::test]
async fn visibility_failure_is_retried_exactly_three_times() {
    let driver = MockDriver::new();
    let engine = engine(&driver);
    let element = ElementHandle::native_id("never-there");

    let result = engine.is_visible(&element, "", true).await;

    match result {
        Err(InteractionError::NotVisible { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected NotVisible, got {:?}", other),
    }
    assert_eq!(driver.state().wait_calls.len(), 3);
}

#[tokio::test]
async fn transient_failures_within_the_ceiling_succeed() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("slow");
    driver
        .state()
        .visible_after
        .insert(native_key(&NativeLocator::Id("slow".into())), 2);

    let visible = engine(&driver).is_visible(&element, "", true).await.unwrap();

    assert!(visible);
    assert_eq!(driver.state().wait_calls.len(), 3);
}

#[tokio::test]
async fn unreported_failure_returns_false_without_retrying() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("optional-dialog");

    let visible = engine(&driver).is_visible(&element, "", false).await.unwrap();

    assert!(!visible);
    assert_eq!(driver.state().wait_calls.len(), 1);
}

#[tokio::test]
async fn text_containment_is_required_for_native_elements() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("greeting");
    let key = native_key(&NativeLocator::Id("greeting".into()));
    driver.make_visible(&key);
    driver
        .state()
        .texts
        .insert(key, "Welcome back, Ada".to_string());

    let engine = engine(&driver);
    assert!(engine.is_visible(&element, "Welcome", true).await.unwrap());
    assert!(!engine.is_visible(&element, "Goodbye", true).await.unwrap());
    // the empty substring always matches
    assert!(engine.is_visible(&element, "", true).await.unwrap());
}

#[tokio::test]
async fn reactive_elements_skip_the_text_check() {
    let driver = MockDriver::new();
    let element = ElementHandle::by_key("banner");
    driver.make_visible(&common::reactive_key(
        match &element {
            ElementHandle::Reactive(locator) => locator,
            _ => unreachable!(),
        },
    ));

    // the expected text is not checked for the reactive kind; a non-throwing
    // wait is success
    let visible = engine(&driver)
        .is_visible(&element, "text the runtime never reports", true)
        .await
        .unwrap();
    assert!(visible);
    assert_eq!(driver.state().reactive_wait_calls.len(), 1);
}

#[tokio::test]
async fn timeout_override_does_not_leak_into_later_calls() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("field");
    driver.make_visible(&native_key(&NativeLocator::Id("field".into())));
    let engine = engine(&driver);

    engine
        .is_visible_within(&element, "", true, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    engine.is_visible(&element, "", true).await.unwrap();

    let waits: Vec<Duration> = driver.state().wait_calls.iter().map(|(_, t)| *t).collect();
    assert_eq!(
        waits,
        vec![Duration::from_secs(5), engine.default_timeout()]
    );
}

#[tokio::test]
async fn click_retries_missing_elements_then_fails() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("flaky-button");
    let key = native_key(&NativeLocator::Id("flaky-button".into()));
    driver.make_visible(&key);
    driver.state().click_failures.insert(key, u32::MAX);

    let result = engine(&driver).click(&element, true).await;

    assert!(matches!(result, Err(InteractionError::ClickFailed { .. })));
}

#[tokio::test]
async fn click_swallows_failures_when_not_reporting() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("maybe-button");

    // element never visible, but the caller only probes
    engine(&driver).click(&element, false).await.unwrap();
    assert!(driver.state().clicks.is_empty());
}

#[tokio::test]
async fn set_text_prefers_the_nested_editable_control() {
    let driver = MockDriver::new();
    let field = ElementHandle::native_id("amount-row");
    let outer = native_key(&NativeLocator::Id("amount-row".into()));
    let inner = NativeLocator::Xpath("//EditText[1]".into());
    driver.make_visible(&outer);
    driver.make_visible(&native_key(&inner));
    driver
        .state()
        .editable_children
        .insert(outer, inner.clone());

    engine(&driver).set_text("1250", &field, true).await.unwrap();

    let state = driver.state();
    assert_eq!(
        state.keys_sent,
        vec![(native_key(&inner), "1250".to_string())]
    );
    assert_eq!(state.clicks.len(), 1);
}

#[tokio::test]
async fn set_text_falls_back_to_the_outer_element() {
    let driver = MockDriver::new();
    let field = ElementHandle::native_id("plain-input");
    let key = native_key(&NativeLocator::Id("plain-input".into()));
    driver.make_visible(&key);

    engine(&driver).set_text("hello", &field, true).await.unwrap();

    assert_eq!(driver.state().keys_sent, vec![(key, "hello".to_string())]);
}

#[tokio::test]
async fn ios_keyboard_dismissal_failure_is_swallowed() {
    let driver = MockDriver::new();
    let field = ElementHandle::native_id("search");
    driver.make_visible(&native_key(&NativeLocator::Id("search".into())));
    driver.state().fail_return_key = true;

    let engine = InteractionEngine::new(driver.clone(), Platform::Ios);
    engine.set_text("query", &field, true).await.unwrap();

    // the keys still went in even though the keyboard stayed up
    assert_eq!(driver.state().keys_sent.len(), 1);
    assert_eq!(driver.state().return_key_presses, 0);
}

#[tokio::test]
async fn get_text_field_requires_a_native_element() {
    let driver = MockDriver::new();
    let result = engine(&driver)
        .get_text_field(&ElementHandle::by_key("reactive-field"))
        .await;
    assert!(matches!(
        result,
        Err(InteractionError::ReactiveUnsupported("get_text_field"))
    ));
}

#[tokio::test]
async fn get_text_field_reads_the_nested_control() {
    let driver = MockDriver::new();
    let field = ElementHandle::native_id("email-row");
    let outer = native_key(&NativeLocator::Id("email-row".into()));
    let inner = NativeLocator::Id("email-input".into());
    driver.make_visible(&outer);
    driver
        .state()
        .texts
        .insert(native_key(&inner), "ada@example.com".to_string());
    driver.state().editable_children.insert(outer, inner);

    let text = engine(&driver).get_text_field(&field).await.unwrap();
    assert_eq!(text, "ada@example.com");
}

#[tokio::test]
async fn wait_disappear_reports_after_the_ceiling() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("spinner");
    driver.make_visible(&native_key(&NativeLocator::Id("spinner".into())));

    let result = engine(&driver)
        .wait_disappear(&element, Some(Duration::from_secs(2)), true)
        .await;

    assert!(matches!(result, Err(InteractionError::StillVisible { .. })));
    assert_eq!(driver.state().hidden_wait_calls.len(), 3);
}

#[tokio::test]
async fn wait_disappear_succeeds_for_absent_elements() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("toast");
    engine(&driver)
        .wait_disappear(&element, None, true)
        .await
        .unwrap();
}

//! Gesture synthesis and scroll-until-found behavior.

mod common;

use std::time::Duration;

use common::{native_key, MockDriver};
use tapwire_core::config::Platform;
use tapwire_core::element::{ElementHandle, NativeLocator, ScreenPoint};
use tapwire_core::engine::{InteractionEngine, InteractionError, ScrollOptions};

fn engine(driver: &std::sync::Arc<MockDriver>) -> InteractionEngine {
    InteractionEngine::new(driver.clone(), Platform::Android)
}

#[tokio::test]
async fn scroll_gesture_uses_screen_fractions_and_edge_inset() {
    let driver = MockDriver::new();
    engine(&driver).scroll_between(0.80, 0.20, false).await.unwrap();

    let gestures = driver.state().gestures.clone();
    assert_eq!(gestures.len(), 1);
    let gesture = gestures[0];
    // screen is 1080x2340; usable height is 2330
    assert_eq!(gesture.from, ScreenPoint { x: 540, y: 1864 });
    assert_eq!(gesture.to, ScreenPoint { x: 540, y: 466 });
    assert_eq!(gesture.move_duration, Duration::from_millis(700));
}

#[tokio::test]
async fn scroll_up_swaps_the_gesture_direction() {
    let driver = MockDriver::new();
    engine(&driver).scroll_between(0.80, 0.20, true).await.unwrap();

    let gesture = driver.state().gestures[0];
    assert_eq!(gesture.from.y, 466);
    assert_eq!(gesture.to.y, 1864);
}

#[tokio::test]
async fn scroll_to_element_performs_exactly_the_attempt_budget() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("below-the-fold");

    let result = engine(&driver)
        .scroll_to_element_with(
            &element,
            ScrollOptions {
                max_attempts: 3,
                ..ScrollOptions::default()
            },
        )
        .await;

    match result {
        Err(InteractionError::NotFoundAfterScroll { remaining, .. }) => {
            assert_eq!(remaining, 0);
        }
        other => panic!("expected NotFoundAfterScroll, got {:?}", other),
    }
    assert_eq!(driver.state().gestures.len(), 3);
}

#[tokio::test]
async fn scroll_to_element_error_mentions_remaining_attempts() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("missing");

    let err = engine(&driver)
        .scroll_to_element_with(
            &element,
            ScrollOptions {
                max_attempts: 3,
                ..ScrollOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("0 scroll attempts remaining"));
}

#[tokio::test]
async fn scroll_to_element_probes_with_a_short_timeout() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("deep-item");

    let _ = engine(&driver)
        .scroll_to_element_with(
            &element,
            ScrollOptions {
                max_attempts: 1,
                ..ScrollOptions::default()
            },
        )
        .await;

    // probe checks use the 1-second scroll timeout, not the 20-second default
    assert!(driver
        .state()
        .wait_calls
        .iter()
        .all(|(_, timeout)| *timeout == Duration::from_secs(1)));
}

#[tokio::test]
async fn found_element_is_centered_on_screen() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("row");
    let key = native_key(&NativeLocator::Id("row".into()));

    // visible after one scroll, located low on the screen
    driver.state().visible_after.insert(key.clone(), 1);
    driver
        .state()
        .locations
        .insert(key, ScreenPoint { x: 540, y: 2000 });

    engine(&driver)
        .scroll_to_element_with(&element, ScrollOptions::default())
        .await
        .unwrap();

    let gestures = driver.state().gestures.clone();
    // one search scroll plus one centering gesture
    assert_eq!(gestures.len(), 2);
    let centering = gestures[1];
    assert_eq!(centering.from, ScreenPoint { x: 540, y: 2000 });
    assert_eq!(centering.to, ScreenPoint { x: 540, y: 1170 });
}

#[tokio::test]
async fn centering_clamps_offscreen_elements_to_the_usable_area() {
    let driver = MockDriver::new();
    let element = ElementHandle::native_id("overflow");
    let key = native_key(&NativeLocator::Id("overflow".into()));
    driver.make_visible(&key);
    driver
        .state()
        .locations
        .insert(key, ScreenPoint { x: 540, y: 5000 });

    engine(&driver).scroll_element_to_middle(&element).await.unwrap();

    let gesture = driver.state().gestures[0];
    assert_eq!(gesture.from.y, 2330);
}

#[tokio::test]
async fn reactive_elements_bypass_gesture_synthesis() {
    let driver = MockDriver::new();
    let element = ElementHandle::by_key("reactive-list-item");

    engine(&driver).scroll_to_element(&element).await.unwrap();

    let state = driver.state();
    assert!(state.gestures.is_empty());
    assert_eq!(state.scroll_into_view_calls.len(), 1);
    assert_eq!(state.scroll_into_view_calls[0].1, 0.5);
}

#[tokio::test]
async fn drag_between_elements_moves_vertically_only() {
    let driver = MockDriver::new();
    let source = ElementHandle::native_id("card");
    let target = ElementHandle::native_id("slot");
    driver
        .state()
        .locations
        .insert(native_key(&NativeLocator::Id("card".into())), ScreenPoint { x: 300, y: 1500 });
    driver
        .state()
        .locations
        .insert(native_key(&NativeLocator::Id("slot".into())), ScreenPoint { x: 700, y: 400 });

    engine(&driver).scroll_move_to(&source, &target).await.unwrap();

    let gesture = driver.state().gestures[0];
    assert_eq!(gesture.from, ScreenPoint { x: 300, y: 1500 });
    // x is pinned to the source; only y travels
    assert_eq!(gesture.to, ScreenPoint { x: 300, y: 400 });
}

#[tokio::test]
async fn horizontal_drag_pins_the_vertical_axis() {
    let driver = MockDriver::new();
    let source = ElementHandle::native_id("tab-strip");
    let target = ElementHandle::native_id("next-tab");
    driver
        .state()
        .locations
        .insert(native_key(&NativeLocator::Id("tab-strip".into())), ScreenPoint { x: 900, y: 600 });
    driver
        .state()
        .locations
        .insert(native_key(&NativeLocator::Id("next-tab".into())), ScreenPoint { x: 100, y: 650 });

    engine(&driver)
        .scroll_move_to_horizontal(&source, &target)
        .await
        .unwrap();

    let gesture = driver.state().gestures[0];
    assert_eq!(gesture.to, ScreenPoint { x: 100, y: 600 });
}

#[tokio::test]
async fn drags_reject_reactive_elements() {
    let driver = MockDriver::new();
    let result = engine(&driver)
        .scroll_move_to(
            &ElementHandle::by_key("reactive"),
            &ElementHandle::native_id("native"),
        )
        .await;
    assert!(matches!(
        result,
        Err(InteractionError::ReactiveUnsupported("scroll_move_to"))
    ));
}

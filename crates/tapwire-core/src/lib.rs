//! # tapwire-core
//!
//! Core library for resilient mobile UI test automation over a remote
//! device farm.
//!
//! This crate provides the foundational components for driving Android and
//! iOS apps in tests: device-farm allocation, driver-session lifecycle
//! management, a bounded-retry interaction engine, and an OCR fallback for
//! content the accessibility tree cannot confirm.
//!
//! ## Modules
//!
//! - [`farm`] - Client for the device-farm inventory and reservation API
//! - [`adb`] - Wrapper around the local `adb` tool for attaching remoted devices
//! - [`capabilities`] - Layered capability construction for driver sessions
//! - [`session`] - Driver-session lifecycle, context switching, teardown
//! - [`engine`] - Bounded-retry interaction engine over the driver
//! - [`ocr`] - Screenshot preprocessing and text recognition fallback
//! - [`driver`] - The driver abstraction tapwire orchestrates
//! - [`element`] - Tagged element handles and screen geometry
//! - [`screen`] - Declarative page-object support
//! - [`server`] - Local driver-server process management
//! - [`config`] - Project configuration
//!
//! ## External Dependencies
//!
//! The following external tools are expected at runtime:
//!
//! - **adb** on `PATH`, for attaching to farm-remoted Android devices
//! - **tesseract** (with the `ocr` cargo feature), for screenshot text
//!   recognition
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tapwire_core::config::Config;
//! use tapwire_core::element::ElementHandle;
//! use tapwire_core::engine::InteractionEngine;
//! use tapwire_core::session::SessionManager;
//! # async fn example(factory: Arc<dyn tapwire_core::driver::DriverFactory>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::load_default());
//!
//! // Acquire the session (allocating a farm device when farm mode is on)
//! let mut manager = SessionManager::new(config.clone(), factory);
//! let driver = manager.session().await?;
//!
//! // Drive the UI through the resilience layer
//! let engine = InteractionEngine::from_config(driver, &config);
//! let login = ElementHandle::native_id("login-button");
//! engine.click(&login, true).await?;
//!
//! // Teardown never throws; failures land in the report
//! let report = manager.close_session().await;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

pub mod adb;
pub mod capabilities;
pub mod config;
pub mod driver;
pub mod element;
pub mod engine;
pub mod farm;
pub mod ocr;
pub mod screen;
pub mod server;
pub mod session;
